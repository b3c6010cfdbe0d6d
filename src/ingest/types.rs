// src/ingest/types.rs
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SourceFailure;
use crate::extract::{DenominationTable, Karat};

/// Retail pricing model a source's quotes follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    /// Per-gram quotes; making charge and VAT both on base value.
    Gulf,
    /// Per-10-gram quotes; making charge, GST on making, GST on base value.
    SouthAsia,
}

/// Quantity of metal one quoted amount refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteUnit {
    #[serde(rename = "gram")]
    PerGram,
    #[serde(rename = "10gm")]
    PerTenGrams,
}

impl QuoteUnit {
    pub fn grams(self) -> f64 {
        match self {
            QuoteUnit::PerGram => 1.0,
            QuoteUnit::PerTenGrams => 10.0,
        }
    }

    /// Same text as the serialized form.
    pub fn label(self) -> &'static str {
        match self {
            QuoteUnit::PerGram => "gram",
            QuoteUnit::PerTenGrams => "10gm",
        }
    }
}

/// Static facts about a source that every quote it produces carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteMeta {
    pub currency: &'static str,
    pub region: Region,
    pub location: &'static str,
    pub unit: QuoteUnit,
}

impl QuoteMeta {
    pub const UAE: QuoteMeta = QuoteMeta {
        currency: "AED",
        region: Region::Gulf,
        location: "UAE",
        unit: QuoteUnit::PerGram,
    };

    pub const KERALA: QuoteMeta = QuoteMeta {
        currency: "INR",
        region: Region::SouthAsia,
        location: "Kerala, India",
        unit: QuoteUnit::PerTenGrams,
    };
}

/// One source's prices for one run. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    source_id: String,
    prices: DenominationTable,
    currency: String,
    region: Region,
    location: String,
    unit: QuoteUnit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    retrieved_at: DateTime<Utc>,
}

impl PriceQuote {
    /// Returns `None` when no usable (finite, non-negative) amount remains:
    /// a quote without denominations is never stored.
    pub fn new(
        source_id: impl Into<String>,
        prices: DenominationTable,
        meta: &QuoteMeta,
        retrieved_at: DateTime<Utc>,
    ) -> Option<Self> {
        let prices: DenominationTable = prices
            .into_iter()
            .filter(|(_, v)| v.is_finite() && *v >= 0.0)
            .collect();
        if prices.is_empty() {
            return None;
        }
        Some(Self {
            source_id: source_id.into(),
            prices,
            currency: meta.currency.to_string(),
            region: meta.region,
            location: meta.location.to_string(),
            unit: meta.unit,
            provider: None,
            retrieved_at,
        })
    }

    /// Upstream attribution (e.g. which market data endpoint answered).
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }
    pub fn prices(&self) -> &DenominationTable {
        &self.prices
    }
    pub fn price(&self, karat: Karat) -> Option<f64> {
        self.prices.get(&karat).copied()
    }
    pub fn currency(&self) -> &str {
        &self.currency
    }
    pub fn region(&self) -> Region {
        self.region
    }
    pub fn location(&self) -> &str {
        &self.location
    }
    pub fn unit(&self) -> QuoteUnit {
        self.unit
    }
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }
    pub fn retrieved_at(&self) -> DateTime<Utc> {
        self.retrieved_at
    }
}

/// All quotes of one collection pass. Sources that failed are absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    retrieved_at: DateTime<Utc>,
    quotes: BTreeMap<String, PriceQuote>,
}

impl PriceSnapshot {
    /// At most one quote per source: a later duplicate is ignored.
    pub fn from_quotes<I>(retrieved_at: DateTime<Utc>, quotes: I) -> Self
    where
        I: IntoIterator<Item = PriceQuote>,
    {
        let mut map = BTreeMap::new();
        for q in quotes {
            if map.contains_key(q.source_id()) {
                tracing::warn!(source = q.source_id(), "duplicate quote ignored");
                continue;
            }
            map.insert(q.source_id().to_string(), q);
        }
        Self {
            retrieved_at,
            quotes: map,
        }
    }

    pub fn retrieved_at(&self) -> DateTime<Utc> {
        self.retrieved_at
    }
    pub fn quotes(&self) -> &BTreeMap<String, PriceQuote> {
        &self.quotes
    }
    pub fn get(&self, source_id: &str) -> Option<&PriceQuote> {
        self.quotes.get(source_id)
    }
    pub fn len(&self) -> usize {
        self.quotes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

/// One upstream site or API. A failure is local to the source.
#[async_trait::async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_quote(&self) -> Result<PriceQuote, SourceFailure>;
    fn id(&self) -> &str;
}
