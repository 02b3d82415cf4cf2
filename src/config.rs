use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_WEATHER_URL: &str = "http://api.openweathermap.org/data/2.5/weather";
pub const DEFAULT_CITY: &str = "Paris";

#[derive(Debug, Clone)]
pub struct WeatherSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub city: String,
    pub timeout: Duration,
    /// Consecutive failures before the client stops calling the provider.
    /// Zero disables the breaker.
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for WeatherSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_WEATHER_URL.to_string(),
            api_key: None,
            city: DEFAULT_CITY.to_string(),
            timeout: Duration::from_secs(10),
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
    pub weather: WeatherSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source; `from_env` passes
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = WeatherSettings::default();
        let weather = WeatherSettings {
            base_url: lookup("WEATHER_BASE_URL").unwrap_or(defaults.base_url),
            api_key: lookup("API_KEY").filter(|key| !key.trim().is_empty()),
            city: lookup("WEATHER_CITY").unwrap_or(defaults.city),
            timeout: parse_or(&lookup, "WEATHER_TIMEOUT_SECS", 10).map(Duration::from_secs)?,
            failure_threshold: parse_or(&lookup, "WEATHER_FAILURE_THRESHOLD", defaults.failure_threshold)?,
            cooldown: parse_or(&lookup, "WEATHER_COOLDOWN_SECS", 30).map(Duration::from_secs)?,
        };

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:5000".to_string()),
            model_path: lookup("CROP_MODEL_PATH")
                .unwrap_or_else(|| "model/crop_recommendation_model.onnx".to_string())
                .into(),
            labels_path: lookup("CROP_LABELS_PATH")
                .unwrap_or_else(|| "model/crop_labels.json".to_string())
                .into(),
            weather,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has invalid value {raw:?}")),
        None => Ok(default),
    }
}
