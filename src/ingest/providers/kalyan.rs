// src/ingest/providers/kalyan.rs
//! Kalyan Jewellers (UAE). Rates are filled in by script, so the page has to be
//! rendered and read once `.priceBlock` exists.

use std::sync::Arc;

use crate::extract::Probe;
use crate::ingest::fetch::PageFetcher;
use crate::ingest::render::PageRenderer;
use crate::ingest::types::QuoteMeta;

use super::scraped::{Retrieval, ScrapedSource};

pub const ID: &str = "kalyan";
pub const URL: &str = "https://www.kalyanjewellers.net/gold-rate/Gold-Rate-Today";
pub const MARKER: &str = ".priceBlock";

pub fn probes() -> Vec<Probe> {
    vec![
        Probe::labelled(".priceBlock .modalClass", Some("label")),
        Probe::labelled(".priceBlock [class*=price]", None),
    ]
}

pub fn source(
    fetcher: Arc<dyn PageFetcher>,
    renderer: Option<Arc<dyn PageRenderer>>,
) -> ScrapedSource {
    ScrapedSource::new(
        ID,
        URL,
        Retrieval::Rendered { marker: MARKER },
        probes(),
        QuoteMeta::UAE,
        fetcher,
    )
    .with_renderer(renderer)
}
