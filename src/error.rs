use std::path::PathBuf;
use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::models::ErrorResponse;

/// Failures talking to the weather provider.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("weather API key is not configured")]
    MissingApiKey,
    #[error("weather request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("weather provider returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed weather response: {0}")]
    Malformed(String),
    #[error("weather provider circuit is open for another {0:?}")]
    CircuitOpen(Duration),
}

/// The request URL carries the API key, so it is stripped before the error
/// can reach a log line or a response.
impl From<reqwest::Error> for WeatherError {
    fn from(e: reqwest::Error) -> Self {
        Self::Request(e.without_url())
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to load model from {path}: {message}")]
    Load { path: PathBuf, message: String },
    #[error("invalid class labels in {path}: {message}")]
    Labels { path: PathBuf, message: String },
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("model returned {probabilities} probabilities for {classes} classes")]
    ClassMismatch { classes: usize, probabilities: usize },
}

/// First feature that failed validation. The messages are part of the HTTP
/// contract and are returned verbatim to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Error: {0} is missing in the input data")]
    Missing(&'static str),
    #[error("Error: {0} should be a numerical value")]
    NonNumeric(&'static str),
    #[error("Error: {feature} should be in the range [{min}, {max}]")]
    OutOfRange {
        feature: &'static str,
        min: f64,
        max: f64,
    },
}

impl ValidationError {
    pub fn feature(&self) -> &'static str {
        match self {
            Self::Missing(feature) | Self::NonNumeric(feature) => *feature,
            Self::OutOfRange { feature, .. } => *feature,
        }
    }
}

/// Everything a `/predict` call can fail with, rendered as `{"error": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Error: {0}")]
    MalformedBody(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("weather unavailable")]
    Weather(#[from] WeatherError),
    #[error("prediction failed")]
    Model(#[from] ModelError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedBody(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Weather(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Model(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}
