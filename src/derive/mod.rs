//! Financial derivation engine.
//!
//! Pure functions only: every constant is injected through
//! [`CalculationConstants`], nothing is read from the environment here.

pub mod customs;
pub mod sovereign;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::PipelineError;
use crate::extract::Karat;
use crate::ingest::types::{PriceQuote, PriceSnapshot, Region};

pub use customs::{duty, Channel, CustomsDuty, CustomsRules, GstRounding};
pub use sovereign::{
    gulf_cascade, south_asian_cascade, GulfRates, SouthAsianRates, SovereignPricing,
};

/// Reporting precision: two decimals, half away from zero.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub(crate) fn money<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(round2(*v))
}

pub(crate) fn money_opt<S: Serializer>(v: &Option<f64>, s: S) -> Result<S::Ok, S::Error> {
    match v {
        Some(x) => s.serialize_some(&round2(*x)),
        None => s.serialize_none(),
    }
}

/// Every rate, threshold and quantity the engine uses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationConstants {
    /// Denomination the retail figures are computed for.
    pub denomination: Karat,
    /// Quantities in grams; the first is normally one sovereign (8 g).
    pub quantities: Vec<f64>,
    pub gulf: GulfRates,
    pub south_asia: SouthAsianRates,
    pub customs: CustomsRules,
    /// Source whose base value (destination currency) feeds the customs figures.
    pub customs_reference: String,
}

impl Default for CalculationConstants {
    fn default() -> Self {
        Self {
            denomination: Karat::K22,
            quantities: vec![8.0, 16.0, 20.0],
            gulf: GulfRates {
                making_rate: 0.08,
                vat_rate: 0.05,
            },
            south_asia: SouthAsianRates {
                making_rate: 0.12,
                making_tax_rate: 0.03,
                tax_rate: 0.05,
            },
            customs: CustomsRules {
                exemption_threshold: 50_000.0,
                declared_rate: 0.06,
                undeclared_rate: 0.33,
                rounding_unit: 50.0,
                gst_on_duty_rate: 0.05,
                gst_rounding: GstRounding::Ceil,
            },
            customs_reference: "candere".to_string(),
        }
    }
}

fn check_rate(name: &str, v: f64) -> Result<(), PipelineError> {
    if v.is_finite() && v >= 0.0 {
        Ok(())
    } else {
        Err(PipelineError::config(format!(
            "{name} must be a finite non-negative number, got {v}"
        )))
    }
}

impl CalculationConstants {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.quantities.is_empty() {
            return Err(PipelineError::config("calculations.quantities is empty"));
        }
        for q in &self.quantities {
            if !(q.is_finite() && *q > 0.0) {
                return Err(PipelineError::PreconditionViolation(format!(
                    "quantity must be a positive number of grams, got {q}"
                )));
            }
        }
        check_rate("gulf.making_rate", self.gulf.making_rate)?;
        check_rate("gulf.vat_rate", self.gulf.vat_rate)?;
        check_rate("south_asia.making_rate", self.south_asia.making_rate)?;
        check_rate("south_asia.making_tax_rate", self.south_asia.making_tax_rate)?;
        check_rate("south_asia.tax_rate", self.south_asia.tax_rate)?;
        check_rate("customs.exemption_threshold", self.customs.exemption_threshold)?;
        check_rate("customs.declared_rate", self.customs.declared_rate)?;
        check_rate("customs.undeclared_rate", self.customs.undeclared_rate)?;
        check_rate("customs.gst_on_duty_rate", self.customs.gst_on_duty_rate)?;
        if !(self.customs.rounding_unit.is_finite() && self.customs.rounding_unit > 0.0) {
            return Err(PipelineError::config(format!(
                "customs.rounding_unit must be positive, got {}",
                self.customs.rounding_unit
            )));
        }
        Ok(())
    }
}

/// One entry of the report's `calculations` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Derivation {
    Sovereign(SovereignPricing),
    Customs(CustomsDuty),
}

pub type Derivations = BTreeMap<String, Derivation>;

/// `8.0` -> `"8"`, `12.5` -> `"12.5"`.
fn grams_label(q: f64) -> String {
    format!("{q}")
}

pub fn sovereign_key(source_id: &str, karat: Karat, grams: f64) -> String {
    format!("{source_id}_{}_{}g", karat.key(), grams_label(grams))
}

pub fn customs_key(grams: f64, channel: Channel) -> String {
    format!("customs_{}g_{}", grams_label(grams), channel.key())
}

/// Retail breakdown for one quote, or `None` when the quote lacks the
/// denomination.
pub fn sovereign_for_quote(
    quote: &PriceQuote,
    karat: Karat,
    grams: f64,
    constants: &CalculationConstants,
) -> Option<SovereignPricing> {
    let price = quote.price(karat)?;
    let unit = quote.unit().grams();
    Some(match quote.region() {
        Region::Gulf => gulf_cascade(price / unit, grams, &constants.gulf),
        Region::SouthAsia => south_asian_cascade(price, unit, grams, &constants.south_asia),
    })
}

/// Compute every figure the snapshot supports. Sources or denominations missing
/// from the snapshot simply produce no entry.
pub fn derive_all(
    snapshot: &PriceSnapshot,
    constants: &CalculationConstants,
) -> Result<Derivations, PipelineError> {
    constants.validate()?;
    let karat = constants.denomination;
    let mut out = Derivations::new();

    for (source_id, quote) in snapshot.quotes() {
        for &grams in &constants.quantities {
            if let Some(p) = sovereign_for_quote(quote, karat, grams, constants) {
                out.insert(sovereign_key(source_id, karat, grams), Derivation::Sovereign(p));
            }
        }
    }

    if let Some(reference) = snapshot.get(&constants.customs_reference) {
        if let Some(price) = reference.price(karat) {
            let per_gram = price / reference.unit().grams();
            for &grams in &constants.quantities {
                let gold_value = per_gram * grams;
                for channel in Channel::ALL {
                    out.insert(
                        customs_key(grams, channel),
                        Derivation::Customs(duty(gold_value, grams, channel, &constants.customs)),
                    );
                }
            }
        }
    }

    tracing::debug!(entries = out.len(), "derivations computed");
    Ok(out)
}
