//! One synchronous run: collect, derive, assemble, persist, then e-mail the
//! report when SMTP is configured. Prints the saved path.

use anyhow::{Context, Result};
use karatmeter::ingest::providers::build_sources;
use karatmeter::notify::EmailSender;
use karatmeter::{report, AppConfig, ReportStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("karatmeter=info,warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = AppConfig::load_default().context("loading configuration")?;
    let (fetcher, renderer) = karatmeter::transport(&config.fetch)?;
    let sources = build_sources(&config, fetcher, renderer);

    let doc = report::generate(&sources, &config).await?;
    let store = ReportStore::new(config.reports.dir.clone());
    let path = store.persist(&doc)?;

    match EmailSender::from_env()? {
        Some(sender) => {
            if let Err(e) = sender.send_report(&doc).await {
                tracing::warn!(error = ?e, "report saved but e-mail failed");
            }
        }
        None => tracing::info!("e-mail not configured; skipping delivery"),
    }

    println!(
        "report {} ({} sources, {} calculations)",
        path.display(),
        doc.sources.len(),
        doc.calculations.len()
    );
    Ok(())
}
