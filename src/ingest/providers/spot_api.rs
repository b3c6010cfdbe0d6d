// src/ingest/providers/spot_api.rs
//! Live market price instead of a retail page: USD per troy ounce of 24k,
//! converted to AED per gram, lower purities by ratio. Two endpoints are tried in
//! order; the first usable answer wins.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::config::SpotSettings;
use crate::derive::round2;
use crate::error::SourceFailure;
use crate::extract::{DenominationTable, Karat};
use crate::ingest::fetch::PageFetcher;
use crate::ingest::types::{PriceQuote, PriceSource, QuoteMeta, QuoteUnit, Region};

pub const ID: &str = "goldapi";

const META: QuoteMeta = QuoteMeta {
    currency: "AED",
    region: Region::Gulf,
    location: "International (Live Market)",
    unit: QuoteUnit::PerGram,
};

#[derive(Debug, Clone)]
pub struct SpotEndpoint {
    /// Attribution written into the quote.
    pub name: String,
    pub url: String,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotConversion {
    pub grams_per_troy_ounce: f64,
    pub usd_to_target: f64,
}

impl SpotConversion {
    pub fn per_gram_24k(&self, usd_per_ounce: f64) -> f64 {
        usd_per_ounce / self.grams_per_troy_ounce * self.usd_to_target
    }

    /// All denominations, rounded to 2 decimals like a quoted retail price.
    pub fn table(&self, usd_per_ounce: f64) -> DenominationTable {
        let pure = self.per_gram_24k(usd_per_ounce);
        Karat::ALL
            .into_iter()
            .map(|k| (k, round2(pure * k.purity())))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct SpotResponse {
    price: Option<f64>,
}

pub struct SpotApiSource {
    endpoints: Vec<SpotEndpoint>,
    conversion: SpotConversion,
    fetcher: Arc<dyn PageFetcher>,
}

impl SpotApiSource {
    pub fn new(
        endpoints: Vec<SpotEndpoint>,
        conversion: SpotConversion,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        Self {
            endpoints,
            conversion,
            fetcher,
        }
    }

    /// Primary + secondary endpoint from settings; the secondary's token is read
    /// from the environment variable the settings name.
    pub fn from_settings(settings: &SpotSettings, fetcher: Arc<dyn PageFetcher>) -> Self {
        let token = std::env::var(&settings.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty());
        let endpoints = vec![
            SpotEndpoint {
                name: "Gold-API.com".to_string(),
                url: settings.primary_url.clone(),
                token: None,
            },
            SpotEndpoint {
                name: "GoldAPI.io".to_string(),
                url: settings.secondary_url.clone(),
                token,
            },
        ];
        let conversion = SpotConversion {
            grams_per_troy_ounce: settings.grams_per_troy_ounce,
            usd_to_target: settings.usd_to_aed,
        };
        Self::new(endpoints, conversion, fetcher)
    }

    async fn ounce_price(&self, ep: &SpotEndpoint) -> anyhow::Result<f64> {
        let headers: Vec<(&str, &str)> = match &ep.token {
            Some(t) => vec![("x-access-token", t.as_str())],
            None => Vec::new(),
        };
        let page = self.fetcher.get(&ep.url, &headers).await?;
        if !page.is_success() {
            anyhow::bail!("HTTP {} from {}", page.status, ep.url);
        }
        let parsed: SpotResponse = serde_json::from_str(&page.body)
            .map_err(|e| anyhow::anyhow!("malformed body from {}: {e}", ep.url))?;
        match parsed.price {
            Some(p) if p.is_finite() && p > 0.0 => Ok(p),
            other => anyhow::bail!("no usable price from {} ({other:?})", ep.url),
        }
    }
}

#[async_trait]
impl PriceSource for SpotApiSource {
    async fn fetch_quote(&self) -> Result<PriceQuote, SourceFailure> {
        let mut last_err = String::from("no endpoints configured");
        for ep in &self.endpoints {
            match self.ounce_price(ep).await {
                Ok(usd) => {
                    let table = self.conversion.table(usd);
                    return PriceQuote::new(ID, table, &META, Utc::now())
                        .map(|q| q.with_provider(ep.name.clone()))
                        .ok_or_else(|| SourceFailure::not_found(ID, "conversion produced no prices"));
                }
                Err(e) => {
                    tracing::debug!(source = ID, endpoint = %ep.name, error = %e, "spot endpoint failed");
                    last_err = format!("{e:#}");
                }
            }
        }
        Err(SourceFailure::unreachable(ID, last_err))
    }

    fn id(&self) -> &str {
        ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_matches_hand_computation() {
        let conv = SpotConversion {
            grams_per_troy_ounce: 31.1035,
            usd_to_target: 3.67,
        };
        // 2400 USD/oz -> 2400 / 31.1035 * 3.67 = 283.183...
        let t = conv.table(2400.0);
        assert_eq!(t[&Karat::K24], 283.18);
        assert_eq!(t[&Karat::K22], 259.58);
        assert_eq!(t[&Karat::K18], 212.39);
    }
}
