// src/ingest/providers/joy_alukkas.rs
//! Joy Alukkas e-shop (UAE). The rate table sits inside a modal that ships with
//! the static HTML; its wrapper classes have changed several times.

use std::sync::Arc;

use crate::extract::{Karat, Probe};
use crate::ingest::fetch::PageFetcher;
use crate::ingest::types::QuoteMeta;

use super::scraped::{Retrieval, ScrapedSource};

pub const ID: &str = "joy_alukkas";
pub const URL: &str = "https://eshop.joyalukkas.com/";

const MODAL_TBODY: &str = "#myModal > div > div > div > div.modal-body > div > table > tbody";

pub fn probes() -> Vec<Probe> {
    let cell = |row: u8| format!("{MODAL_TBODY} > tr:nth-child({row}) > td:nth-child(2)");
    let (r1, r2, r3) = (cell(1), cell(2), cell(3));
    vec![
        Probe::table_rows("#myModal table tr"),
        Probe::table_rows(".gold-rate-attribute-list table tr"),
        Probe::table_rows("div.modal-body table tr"),
        Probe::table_rows("table tbody tr"),
        Probe::positional(&[
            (r1.as_str(), Karat::K24),
            (r2.as_str(), Karat::K22),
            (r3.as_str(), Karat::K18),
        ]),
    ]
}

pub fn source(fetcher: Arc<dyn PageFetcher>) -> ScrapedSource {
    ScrapedSource::new(ID, URL, Retrieval::Static, probes(), QuoteMeta::UAE, fetcher)
}
