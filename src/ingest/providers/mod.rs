// src/ingest/providers/mod.rs
//! Built-in price sources. Each site module exposes its id, url and probe list
//! so tests can drive the probes against saved markup.

pub mod bhima;
pub mod candere;
pub mod joy_alukkas;
pub mod kalyan;
pub mod scraped;
pub mod spot_api;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::ingest::fetch::PageFetcher;
use crate::ingest::render::PageRenderer;
use crate::ingest::types::PriceSource;

/// Ids of every built-in source, in report order.
pub const KNOWN_IDS: [&str; 5] = [
    spot_api::ID,
    kalyan::ID,
    joy_alukkas::ID,
    bhima::ID,
    candere::ID,
];

/// One source by id, regardless of the enabled toggles.
pub fn build_source(
    id: &str,
    cfg: &AppConfig,
    fetcher: Arc<dyn PageFetcher>,
    renderer: Option<Arc<dyn PageRenderer>>,
) -> Option<Arc<dyn PriceSource>> {
    let src: Arc<dyn PriceSource> = match id {
        spot_api::ID => Arc::new(spot_api::SpotApiSource::from_settings(&cfg.spot, fetcher)),
        kalyan::ID => Arc::new(kalyan::source(fetcher, renderer)),
        joy_alukkas::ID => Arc::new(joy_alukkas::source(fetcher)),
        bhima::ID => Arc::new(bhima::source(fetcher)),
        candere::ID => Arc::new(candere::source(fetcher)),
        _ => return None,
    };
    Some(src)
}

/// Every enabled source. Toggles naming an unknown id are reported and ignored.
pub fn build_sources(
    cfg: &AppConfig,
    fetcher: Arc<dyn PageFetcher>,
    renderer: Option<Arc<dyn PageRenderer>>,
) -> Vec<Arc<dyn PriceSource>> {
    for id in cfg.sources.keys() {
        if !KNOWN_IDS.contains(&id.as_str()) {
            tracing::warn!(source = %id, "config names an unknown source; ignored");
        }
    }
    KNOWN_IDS
        .iter()
        .filter(|id| cfg.is_enabled(id))
        .filter_map(|id| build_source(id, cfg, fetcher.clone(), renderer.clone()))
        .collect()
}
