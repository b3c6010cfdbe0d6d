// src/ingest/providers/scraped.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::SourceFailure;
use crate::extract::{extract_from_markup, Probe};
use crate::ingest::fetch::PageFetcher;
use crate::ingest::render::PageRenderer;
use crate::ingest::types::{PriceQuote, PriceSource, QuoteMeta};

/// How a site's markup is obtained.
#[derive(Debug, Clone)]
pub enum Retrieval {
    /// Plain GET; the prices are in the served HTML.
    Static,
    /// Prices are injected client-side; read the DOM once `marker` exists.
    Rendered { marker: &'static str },
}

/// A retail site scraped with an ordered probe list.
pub struct ScrapedSource {
    id: String,
    url: String,
    retrieval: Retrieval,
    probes: Vec<Probe>,
    meta: QuoteMeta,
    fetcher: Arc<dyn PageFetcher>,
    renderer: Option<Arc<dyn PageRenderer>>,
}

impl ScrapedSource {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        retrieval: Retrieval,
        probes: Vec<Probe>,
        meta: QuoteMeta,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            retrieval,
            probes,
            meta,
            fetcher,
            renderer: None,
        }
    }

    pub fn with_renderer(mut self, renderer: Option<Arc<dyn PageRenderer>>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    async fn markup(&self) -> Result<String, SourceFailure> {
        match &self.retrieval {
            Retrieval::Static => {
                let page = self
                    .fetcher
                    .get(&self.url, &[])
                    .await
                    .map_err(|e| SourceFailure::unreachable(&self.id, format!("{e:#}")))?;
                if !page.is_success() {
                    return Err(SourceFailure::unreachable(
                        &self.id,
                        format!("HTTP {} from {}", page.status, self.url),
                    ));
                }
                Ok(page.body)
            }
            Retrieval::Rendered { marker } => {
                let renderer = self.renderer.as_ref().ok_or_else(|| {
                    SourceFailure::unreachable(&self.id, "rendered source but no webdriver configured")
                })?;
                renderer
                    .render(&self.url, marker)
                    .await
                    .map_err(|e| SourceFailure::unreachable(&self.id, format!("{e:#}")))
            }
        }
    }
}

#[async_trait]
impl PriceSource for ScrapedSource {
    async fn fetch_quote(&self) -> Result<PriceQuote, SourceFailure> {
        let markup = self.markup().await?;
        let table = extract_from_markup(&markup, &self.probes);
        PriceQuote::new(self.id.clone(), table, &self.meta, Utc::now()).ok_or_else(|| {
            SourceFailure::not_found(
                &self.id,
                format!("none of {} probes matched", self.probes.len()),
            )
        })
    }

    fn id(&self) -> &str {
        &self.id
    }
}
