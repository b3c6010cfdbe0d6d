//! Karatmeter service entrypoint.
//! Boots the Axum HTTP server over the price pipeline and exposes `/metrics`.

use anyhow::Context;
use karatmeter::{api::AppState, metrics::Metrics, AppConfig};
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - KARATMETER_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("KARATMETER_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("karatmeter=info,warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    enable_dev_tracing();

    let config = AppConfig::load_default().context("loading configuration")?;
    let (fetcher, renderer) = karatmeter::transport(&config.fetch)?;
    let metrics = Metrics::install()?;

    tracing::info!(
        report_dir = %config.reports.dir.display(),
        denomination = %config.calculations.denomination,
        "karatmeter starting"
    );

    let state = AppState::new(config, fetcher, renderer);
    let router = karatmeter::create_router(state, &metrics);

    Ok(router.into())
}
