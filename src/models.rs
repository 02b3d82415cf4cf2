use serde::{Deserialize, Serialize};

/// One ranked entry, serialized as `[label, percentage]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropSuggestion(pub String, pub String);

impl CropSuggestion {
    pub fn label(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn percentage(&self) -> &str {
        &self.1
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub crop_suggestions: Vec<CropSuggestion>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub classes: usize,
}
