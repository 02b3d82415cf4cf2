use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crop_advisor::handlers::{self, AppState};
use crop_advisor::prediction::OnnxClassifier;
use crop_advisor::weather::OpenWeatherClient;
use crop_advisor::Config;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crop_advisor=info,actix_web=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    if config.weather.api_key.is_none() {
        tracing::warn!("API_KEY is not set, every prediction will report weather unavailable");
    }

    // No model, no service.
    let classifier = OnnxClassifier::load(&config.model_path, &config.labels_path)
        .context("could not load crop model")?;
    let weather = OpenWeatherClient::new(&config.weather).context("could not build weather client")?;

    let state = web::Data::new(AppState::new(Arc::new(weather), Arc::new(classifier)));

    tracing::info!(
        addr = %config.bind_addr,
        city = %config.weather.city,
        "server starting"
    );

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .configure(handlers::configure)
    })
    .bind(&config.bind_addr)
    .with_context(|| format!("could not bind {}", config.bind_addr))?
    .run()
    .await?;

    Ok(())
}
