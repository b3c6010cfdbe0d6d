// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod derive;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod report;

use std::sync::Arc;

use anyhow::Result;

use crate::config::FetchSettings;
use crate::ingest::fetch::{HttpFetcher, PageFetcher};
use crate::ingest::render::{PageRenderer, WebDriverRenderer};

pub use crate::api::create_router;
pub use crate::config::AppConfig;
pub use crate::error::{PipelineError, SourceFailure};
pub use crate::report::{ReportDocument, ReportStore};

/// Network capabilities for the adapters: one shared HTTP client and, when a
/// WebDriver endpoint is configured, a renderer for script-filled pages.
pub fn transport(
    settings: &FetchSettings,
) -> Result<(Arc<dyn PageFetcher>, Option<Arc<dyn PageRenderer>>)> {
    let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new(settings)?);
    let renderer = match settings.webdriver_url.as_deref() {
        Some(url) if !url.trim().is_empty() => {
            let r: Arc<dyn PageRenderer> = Arc::new(WebDriverRenderer::new(url, settings)?);
            Some(r)
        }
        _ => {
            tracing::info!("no webdriver configured; rendered sources will be reported unreachable");
            None
        }
    };
    Ok((fetcher, renderer))
}
