use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::ApiError;
use crate::features::FeatureSet;
use crate::models::{HealthResponse, PredictionResponse};
use crate::prediction::{self, Classifier};
use crate::weather::WeatherSource;

/// Shared per-process state. Both collaborators are read-only after startup.
pub struct AppState {
    pub weather: Arc<dyn WeatherSource>,
    pub classifier: Arc<dyn Classifier>,
}

impl AppState {
    pub fn new(weather: Arc<dyn WeatherSource>, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            weather,
            classifier,
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/predict").route(web::post().to(predict)))
        .service(web::resource("/health").route(web::get().to(health)));
}

/// The body is parsed as JSON whatever the declared content type.
pub async fn predict(state: web::Data<AppState>, body: web::Bytes) -> Result<HttpResponse, ApiError> {
    let span = tracing::info_span!("predict", request_id = %Uuid::new_v4());
    handle_predict(state, body).instrument(span).await
}

async fn handle_predict(state: web::Data<AppState>, body: web::Bytes) -> Result<HttpResponse, ApiError> {
    let fields = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(fields)) => fields,
        Ok(_) => {
            return Err(ApiError::MalformedBody(
                "request body must be a JSON object".to_string(),
            ))
        }
        Err(e) => return Err(ApiError::MalformedBody(format!("invalid JSON body: {e}"))),
    };

    let weather = state.weather.current().await.map_err(|e| {
        tracing::warn!(error = %e, "weather lookup failed");
        e
    })?;

    let features = FeatureSet::merge(fields, &weather).validate().map_err(|e| {
        tracing::debug!(feature = e.feature(), "rejected input: {e}");
        e
    })?;

    let crop_suggestions = prediction::predict(state.classifier.as_ref(), &features).map_err(|e| {
        tracing::error!(error = %e, "crop model failed");
        e
    })?;

    tracing::info!(
        suggestions = crop_suggestions.len(),
        top = crop_suggestions.first().map(|s| s.label()).unwrap_or("-"),
        "prediction served"
    );

    Ok(HttpResponse::Ok().json(PredictionResponse { crop_suggestions }))
}

pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        classes: state.classifier.classes().len(),
    })
}
