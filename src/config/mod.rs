// src/config/mod.rs
//! Run configuration: enabled sources, calculation constants, fetch limits,
//! spot-price conversion and report storage.
//!
//! Lookup order for the document:
//! 1) `$KARATMETER_CONFIG_PATH`
//! 2) `config/karatmeter.toml`
//! 3) `config/karatmeter.json`
//! 4) built-in defaults
//!
//! Secrets never live here; SMTP credentials and API tokens are read from the
//! environment by the components that need them.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::derive::{
    CalculationConstants, CustomsRules, GstRounding, GulfRates, SouthAsianRates,
};
use crate::error::PipelineError;
use crate::extract::Karat;

pub const ENV_CONFIG_PATH: &str = "KARATMETER_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/karatmeter.toml";
pub const DEFAULT_JSON_PATH: &str = "config/karatmeter.json";

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Per HTTP request.
    pub http_timeout_secs: u64,
    /// Wait for the marker element of a rendered page.
    pub render_timeout_secs: u64,
    /// Hard ceiling for one source, retries included.
    pub source_deadline_secs: u64,
    /// Extra attempts on transport errors (non-2xx is never retried).
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub user_agent: String,
    /// W3C WebDriver endpoint for rendered sources; unset disables them.
    pub webdriver_url: Option<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            http_timeout_secs: 10,
            render_timeout_secs: 30,
            source_deadline_secs: 60,
            max_retries: 1,
            retry_backoff_ms: 500,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            webdriver_url: None,
        }
    }
}

impl FetchSettings {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }
    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs.max(1))
    }
    pub fn source_deadline(&self) -> Duration {
        Duration::from_secs(self.source_deadline_secs.max(1))
    }
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Longest a source can legitimately take before its own bounded waits
    /// give up: every HTTP attempt plus backoff, or one render wait plus a
    /// request around it.
    pub fn inner_budget(&self) -> Duration {
        let attempts = self.max_retries.saturating_add(1);
        let backoff_steps = self.max_retries.saturating_mul(attempts) / 2;
        let fetch = self.http_timeout() * attempts + self.retry_backoff() * backoff_steps;
        let render = self.render_timeout() + self.http_timeout();
        fetch.max(render)
    }

    /// The per-source deadline must leave room for the inner waits, otherwise
    /// it pre-empts them on every slow source.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let budget = self.inner_budget();
        if self.source_deadline() < budget {
            return Err(PipelineError::config(format!(
                "fetch.source_deadline_secs ({}s) is shorter than the timeouts it bounds ({budget:?}); \
                 raise it or lower fetch.http_timeout_secs, fetch.render_timeout_secs, fetch.max_retries",
                self.source_deadline().as_secs()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotSettings {
    pub grams_per_troy_ounce: f64,
    /// Target currency units per USD.
    pub usd_to_aed: f64,
    pub primary_url: String,
    pub secondary_url: String,
    /// Environment variable holding the secondary endpoint's access token.
    pub token_env: String,
}

impl Default for SpotSettings {
    fn default() -> Self {
        Self {
            grams_per_troy_ounce: 31.1035,
            usd_to_aed: 3.67,
            primary_url: "https://api.gold-api.com/price/XAU".to_string(),
            secondary_url: "https://www.goldapi.io/api/XAU/USD".to_string(),
            token_env: "GOLDAPI_TOKEN".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub dir: PathBuf,
    pub list_limit: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("reports"),
            list_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AppConfig {
    /// Source id → enabled. Sources not listed are enabled.
    pub sources: BTreeMap<String, bool>,
    pub calculations: CalculationConstants,
    pub fetch: FetchSettings,
    pub spot: SpotSettings,
    pub reports: ReportSettings,
}

impl AppConfig {
    pub fn is_enabled(&self, source_id: &str) -> bool {
        self.sources.get(source_id).copied().unwrap_or(true)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, PipelineError> {
        let raw: RawConfig = toml::from_str(s)
            .map_err(|e| PipelineError::config(format!("toml: {e}")))?;
        raw.validate()
    }

    pub fn from_json_str(s: &str) -> Result<Self, PipelineError> {
        let raw: RawConfig = serde_json::from_str(s)
            .map_err(|e| PipelineError::config(format!("json: {e}")))?;
        raw.validate()
    }

    /// Load from an explicit path. The extension picks the format; an unknown
    /// extension tries TOML, then JSON.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let parsed = match ext.as_str() {
            "toml" => Self::from_toml_str(&content),
            "json" => Self::from_json_str(&content),
            _ => Self::from_toml_str(&content).or_else(|_| Self::from_json_str(&content)),
        };
        parsed.with_context(|| format!("config {}", path.display()))
    }

    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from(&pb);
        }
        for candidate in [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return Self::load_from(&pb);
            }
        }
        tracing::info!("no config file found, using built-in defaults");
        Ok(Self::default())
    }
}

// ---- raw document ----

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    sources: BTreeMap<String, bool>,
    calculations: Option<RawCalculations>,
    fetch: FetchSettings,
    spot: SpotSettings,
    reports: ReportSettings,
}

#[derive(Debug, Deserialize)]
struct RawCalculations {
    denomination: Option<String>,
    quantities: Option<Vec<f64>>,
    customs_reference: Option<String>,
    gulf: Option<RawGulf>,
    south_asia: Option<RawSouthAsia>,
    customs: Option<RawCustoms>,
}

#[derive(Debug, Default, Deserialize)]
struct RawGulf {
    making_rate: Option<f64>,
    vat_rate: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSouthAsia {
    making_rate: Option<f64>,
    making_tax_rate: Option<f64>,
    tax_rate: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCustoms {
    exemption_threshold: Option<f64>,
    declared_rate: Option<f64>,
    undeclared_rate: Option<f64>,
    rounding_unit: Option<f64>,
    gst_on_duty_rate: Option<f64>,
    gst_rounding: Option<GstRounding>,
}

fn required(v: Option<f64>, key: &str) -> Result<f64, PipelineError> {
    v.ok_or_else(|| PipelineError::config(format!("missing calculations.{key}")))
}

impl RawCalculations {
    /// Rates and thresholds are mandatory once a `[calculations]` section exists;
    /// denomination, quantities, reference source and the GST-on-duty policy
    /// fall back to the defaults.
    fn validate(self) -> Result<CalculationConstants, PipelineError> {
        let defaults = CalculationConstants::default();
        let denomination = match self.denomination {
            Some(d) => d.parse::<Karat>().map_err(PipelineError::config)?,
            None => defaults.denomination,
        };
        let gulf = self.gulf.unwrap_or_default();
        let south = self.south_asia.unwrap_or_default();
        let customs = self.customs.unwrap_or_default();

        let constants = CalculationConstants {
            denomination,
            quantities: self.quantities.unwrap_or(defaults.quantities),
            gulf: GulfRates {
                making_rate: required(gulf.making_rate, "gulf.making_rate")?,
                vat_rate: required(gulf.vat_rate, "gulf.vat_rate")?,
            },
            south_asia: SouthAsianRates {
                making_rate: required(south.making_rate, "south_asia.making_rate")?,
                making_tax_rate: required(south.making_tax_rate, "south_asia.making_tax_rate")?,
                tax_rate: required(south.tax_rate, "south_asia.tax_rate")?,
            },
            customs: CustomsRules {
                exemption_threshold: required(
                    customs.exemption_threshold,
                    "customs.exemption_threshold",
                )?,
                declared_rate: required(customs.declared_rate, "customs.declared_rate")?,
                undeclared_rate: required(customs.undeclared_rate, "customs.undeclared_rate")?,
                rounding_unit: required(customs.rounding_unit, "customs.rounding_unit")?,
                gst_on_duty_rate: customs
                    .gst_on_duty_rate
                    .unwrap_or(defaults.customs.gst_on_duty_rate),
                gst_rounding: customs.gst_rounding.unwrap_or(defaults.customs.gst_rounding),
            },
            customs_reference: self
                .customs_reference
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.customs_reference),
        };
        constants.validate()?;
        Ok(constants)
    }
}

impl RawConfig {
    fn validate(self) -> Result<AppConfig, PipelineError> {
        let calculations = match self.calculations {
            Some(c) => c.validate()?,
            None => CalculationConstants::default(),
        };
        if !(self.spot.grams_per_troy_ounce > 0.0 && self.spot.usd_to_aed > 0.0) {
            return Err(PipelineError::config(
                "spot.grams_per_troy_ounce and spot.usd_to_aed must be positive",
            ));
        }
        self.fetch.validate()?;
        Ok(AppConfig {
            sources: self.sources,
            calculations,
            fetch: self.fetch,
            spot: self.spot,
            reports: self.reports,
        })
    }
}
