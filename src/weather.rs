//! Current weather lookup for the configured city.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::WeatherSettings;
use crate::error::WeatherError;
use crate::round_to;

const ABSOLUTE_ZERO_CELSIUS: f64 = 273.15;

/// Weather features for a single request. Temperature is in Celsius,
/// humidity in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeatherReading {
    pub temperature: f64,
    pub humidity: f64,
}

impl WeatherReading {
    /// Converts a provider reading in Kelvin, keeping one decimal.
    pub fn from_kelvin(kelvin: f64, humidity: f64) -> Self {
        Self {
            temperature: round_to(kelvin_to_celsius(kelvin), 1),
            humidity,
        }
    }
}

fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - ABSOLUTE_ZERO_CELSIUS
}

#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn current(&self) -> Result<WeatherReading, WeatherError>;
}

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    main: ProviderMain,
}

#[derive(Debug, Deserialize)]
struct ProviderMain {
    temp: f64,
    humidity: f64,
}

/// OpenWeatherMap current-weather client. Each call makes exactly one
/// request; repeated failures trip a breaker so a dead provider is not
/// hammered by every incoming prediction.
pub struct OpenWeatherClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    city: String,
    breaker: CircuitBreaker,
}

impl OpenWeatherClient {
    pub fn new(settings: &WeatherSettings) -> Result<Self, WeatherError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            city: settings.city.clone(),
            breaker: CircuitBreaker::new(settings.failure_threshold, settings.cooldown),
        })
    }

    async fn fetch(&self, api_key: &str) -> Result<WeatherReading, WeatherError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("appid", api_key), ("q", self.city.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WeatherError::Status(status));
        }

        let body = response.bytes().await?;
        let parsed: ProviderResponse =
            serde_json::from_slice(&body).map_err(|e| WeatherError::Malformed(e.to_string()))?;

        Ok(WeatherReading::from_kelvin(parsed.main.temp, parsed.main.humidity))
    }
}

#[async_trait]
impl WeatherSource for OpenWeatherClient {
    async fn current(&self) -> Result<WeatherReading, WeatherError> {
        let api_key = self.api_key.as_deref().ok_or(WeatherError::MissingApiKey)?;
        self.breaker.check()?;

        match self.fetch(api_key).await {
            Ok(reading) => {
                self.breaker.record_success();
                tracing::debug!(
                    city = %self.city,
                    temperature = reading.temperature,
                    humidity = reading.humidity,
                    "weather fetched"
                );
                Ok(reading)
            }
            Err(e) => {
                if self.breaker.record_failure() {
                    tracing::warn!(city = %self.city, "weather circuit opened after repeated failures");
                }
                Err(e)
            }
        }
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

#[derive(Debug)]
struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            state: Mutex::new(BreakerState::default()),
        }
    }

    /// After the cooldown a single caller is let through as a probe; the
    /// window is pushed forward so the rest keep failing fast until the
    /// probe records a result.
    fn check(&self) -> Result<(), WeatherError> {
        let mut state = self.state.lock();
        let Some(until) = state.open_until else {
            return Ok(());
        };
        let now = Instant::now();
        if now < until {
            return Err(WeatherError::CircuitOpen(until - now));
        }
        state.open_until = Some(now + self.cooldown);
        Ok(())
    }

    fn record_success(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures = 0;
        state.open_until = None;
    }

    /// Returns true when this failure (re)opened the circuit.
    fn record_failure(&self) -> bool {
        if self.threshold == 0 {
            return false;
        }
        let mut state = self.state.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        if state.consecutive_failures >= self.threshold {
            state.open_until = Some(Instant::now() + self.cooldown);
            true
        } else {
            false
        }
    }
}
