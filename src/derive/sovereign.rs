//! Retail "sovereign" pricing cascades.
//!
//! Both cascades accumulate unrounded values; rounding to 2 decimals happens only
//! when a result is serialized. Tax is always computed on the base metal value,
//! never on base + making.
//!
//! Precondition for every function here: `quantity` is a finite value > 0 and
//! prices are non-negative. Callers validate this up front
//! (see [`super::CalculationConstants::validate`]).

use serde::{Deserialize, Serialize};

use super::{money, money_opt};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GulfRates {
    pub making_rate: f64,
    pub vat_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SouthAsianRates {
    pub making_rate: f64,
    pub making_tax_rate: f64,
    pub tax_rate: f64,
}

/// Breakdown for one source / denomination / quantity triple, in the source's
/// currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SovereignPricing {
    pub grams: f64,
    #[serde(serialize_with = "money")]
    pub base_price: f64,
    #[serde(serialize_with = "money")]
    pub making_charge: f64,
    /// Only present for regions that tax the making charge separately.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "money_opt"
    )]
    pub making_tax: Option<f64>,
    /// `base_price + making_charge (+ making_tax)`.
    #[serde(serialize_with = "money")]
    pub subtotal: f64,
    /// VAT (Gulf) or GST (South Asia), on base only.
    #[serde(serialize_with = "money")]
    pub tax: f64,
    #[serde(serialize_with = "money")]
    pub total: f64,
}

/// Region A: per-gram price, making charge and VAT both on base.
pub fn gulf_cascade(price_per_gram: f64, quantity: f64, rates: &GulfRates) -> SovereignPricing {
    debug_assert!(quantity > 0.0, "quantity must be positive");
    let base = price_per_gram * quantity;
    let making = base * rates.making_rate;
    let tax = base * rates.vat_rate;
    let subtotal = base + making;
    SovereignPricing {
        grams: quantity,
        base_price: base,
        making_charge: making,
        making_tax: None,
        subtotal,
        tax,
        total: base + making + tax,
    }
}

/// Region B: price quoted per `bulk_unit_size` grams; GST on the making charge
/// plus GST on base.
pub fn south_asian_cascade(
    price_per_bulk_unit: f64,
    bulk_unit_size: f64,
    quantity: f64,
    rates: &SouthAsianRates,
) -> SovereignPricing {
    debug_assert!(quantity > 0.0, "quantity must be positive");
    debug_assert!(bulk_unit_size > 0.0, "bulk unit size must be positive");
    let base = (price_per_bulk_unit / bulk_unit_size) * quantity;
    let making = base * rates.making_rate;
    let making_tax = making * rates.making_tax_rate;
    let tax = base * rates.tax_rate;
    SovereignPricing {
        grams: quantity,
        base_price: base,
        making_charge: making,
        making_tax: Some(making_tax),
        subtotal: base + making + making_tax,
        tax,
        total: base + making + making_tax + tax,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn gulf_reference_case() {
        let r = gulf_cascade(
            212.5,
            8.0,
            &GulfRates {
                making_rate: 0.08,
                vat_rate: 0.05,
            },
        );
        assert!(close(r.base_price, 1700.0));
        assert!(close(r.making_charge, 136.0));
        assert!(close(r.tax, 85.0));
        assert!(close(r.total, 1921.0));
        assert!(r.making_tax.is_none());
    }

    #[test]
    fn south_asian_reference_case_keeps_unrounded_total() {
        let r = south_asian_cascade(
            62450.0,
            10.0,
            8.0,
            &SouthAsianRates {
                making_rate: 0.12,
                making_tax_rate: 0.03,
                tax_rate: 0.05,
            },
        );
        assert!(close(r.base_price, 49960.0));
        assert!(close(r.making_charge, 5995.2));
        assert!(close(r.making_tax.unwrap(), 179.856));
        assert!(close(r.tax, 2498.0));
        assert!(close(r.total, 58633.056));

        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["total"], 58633.06);
        assert_eq!(v["making_tax"], 179.86);
    }

    #[test]
    fn tax_is_on_base_not_on_base_plus_making() {
        let rates = GulfRates {
            making_rate: 0.5,
            vat_rate: 0.1,
        };
        let r = gulf_cascade(100.0, 1.0, &rates);
        assert!(close(r.tax, 10.0));
        assert!(close(r.subtotal, 150.0));
        assert!(close(r.total, 160.0));
    }

    #[test]
    fn quantities_are_independent() {
        let rates = GulfRates {
            making_rate: 0.08,
            vat_rate: 0.05,
        };
        let one = gulf_cascade(212.5, 8.0, &rates);
        let two = gulf_cascade(212.5, 16.0, &rates);
        let again = gulf_cascade(212.5, 8.0, &rates);
        assert_eq!(one, again);
        assert!(close(two.total, one.total * 2.0));
    }
}
