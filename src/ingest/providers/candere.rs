// src/ingest/providers/candere.rs
//! Candere, Kerala page. Quotes are INR per 10 grams, one card per karat.

use std::sync::Arc;

use crate::extract::{Karat, Probe};
use crate::ingest::fetch::PageFetcher;
use crate::ingest::types::QuoteMeta;

use super::scraped::{Retrieval, ScrapedSource};

pub const ID: &str = "candere";
pub const URL: &str = "https://www.candere.com/gold-rate-today/kerala";

const CARD_WRAPPER: &str = "#maincontent > div.columns > div > div.goldRateWrapper > div.sectionBanner > div > div > div.goldCard__wrapper";

pub fn probes() -> Vec<Probe> {
    let full_24 = format!("{CARD_WRAPPER} > div.goldCard.goldCard--one > div");
    let full_22 = format!("{CARD_WRAPPER} > div.goldCard.goldCard--two");
    vec![
        Probe::positional(&[
            (".goldCard--one .goldCard--rate", Karat::K24),
            (".goldCard--two .goldCard--rate", Karat::K22),
        ]),
        Probe::positional(&[
            (".goldCard.goldCard--one .goldCard--left p.goldCard--rate", Karat::K24),
            (".goldCard.goldCard--two .goldCard--left p.goldCard--rate", Karat::K22),
        ]),
        Probe::positional(&[
            (full_24.as_str(), Karat::K24),
            (full_22.as_str(), Karat::K22),
        ]),
        Probe::positional(&[
            ("div.goldCard--one p", Karat::K24),
            ("div.goldCard--two p", Karat::K22),
        ]),
    ]
}

pub fn source(fetcher: Arc<dyn PageFetcher>) -> ScrapedSource {
    ScrapedSource::new(ID, URL, Retrieval::Static, probes(), QuoteMeta::KERALA, fetcher)
}
