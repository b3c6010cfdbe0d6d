// src/ingest/providers/bhima.rs
//! Bhima Jewellers (UAE). No stable ids; any table with karat rows, then any
//! element whose class mentions a price or rate.

use std::sync::Arc;

use crate::extract::Probe;
use crate::ingest::fetch::PageFetcher;
use crate::ingest::types::QuoteMeta;

use super::scraped::{Retrieval, ScrapedSource};

pub const ID: &str = "bhima";
pub const URL: &str = "https://bhima.ae/gold-rates/";

/// Real per-gram AED rates are well above this; smaller numbers in a rate
/// table are headers, percentages or weights.
const TABLE_FLOOR: f64 = 150.0;

pub fn probes() -> Vec<Probe> {
    vec![
        Probe::table_rows_above("table tr", TABLE_FLOOR),
        Probe::labelled(
            "div[class*=price], span[class*=price], p[class*=price], \
             div[class*=rate], span[class*=rate], p[class*=rate]",
            None,
        ),
    ]
}

pub fn source(fetcher: Arc<dyn PageFetcher>) -> ScrapedSource {
    ScrapedSource::new(ID, URL, Retrieval::Static, probes(), QuoteMeta::UAE, fetcher)
}
