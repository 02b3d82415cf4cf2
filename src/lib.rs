//! Crop recommendation service.
//!
//! Merges soil measurements submitted by the caller with the current weather
//! for a fixed city, validates the resulting feature set and asks a
//! pre-trained classifier which crops fit best.

pub mod config;
pub mod error;
pub mod features;
pub mod handlers;
pub mod models;
pub mod prediction;
pub mod weather;

pub use config::Config;
pub use error::{ApiError, ModelError, ValidationError, WeatherError};
pub use handlers::AppState;

/// Rounds half away from zero to `places` decimal places.
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
