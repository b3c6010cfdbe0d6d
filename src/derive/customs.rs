//! Customs duty on gold carried across the border.
//!
//! - Nothing is due up to and including the exemption threshold.
//! - Above it, the taxable part is charged at the channel's rate and the duty is
//!   rounded UP to the next multiple of the rounding unit.
//! - GST on duty is a percentage of the already-rounded duty. Whether it is itself
//!   ceiling-rounded is a policy switch ([`GstRounding`]).

use serde::{Deserialize, Serialize};

use super::money;

/// Customs declaration category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Channel {
    /// Declared goods, low rate.
    Red,
    /// Non-declared goods, high rate.
    Green,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Red, Channel::Green];

    pub fn key(self) -> &'static str {
        match self {
            Channel::Red => "red",
            Channel::Green => "green",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GstRounding {
    /// Round GST on duty up to the rounding unit, like the duty itself.
    Ceil,
    /// Keep the exact percentage.
    Exact,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CustomsRules {
    pub exemption_threshold: f64,
    pub declared_rate: f64,
    pub undeclared_rate: f64,
    pub rounding_unit: f64,
    pub gst_on_duty_rate: f64,
    pub gst_rounding: GstRounding,
}

impl CustomsRules {
    pub fn rate_for(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Red => self.declared_rate,
            Channel::Green => self.undeclared_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomsDuty {
    pub grams: f64,
    #[serde(serialize_with = "money")]
    pub gold_value: f64,
    #[serde(serialize_with = "money")]
    pub exemption_threshold: f64,
    #[serde(serialize_with = "money")]
    pub taxable_amount: f64,
    pub duty_rate_applied: f64,
    #[serde(serialize_with = "money")]
    pub customs_duty: f64,
    #[serde(serialize_with = "money")]
    pub gst_on_duty: f64,
    #[serde(serialize_with = "money")]
    pub total_with_gst: f64,
    #[serde(serialize_with = "money")]
    pub total_without_gst: f64,
    pub channel: Channel,
}

/// Tolerance on `amount / unit`, far below one cent of any realistic unit.
const CEIL_EPSILON: f64 = 1e-9;

/// Smallest multiple of `unit` that is >= `amount`. Any positive amount costs
/// at least one unit.
///
/// Only float noise such as `1500.0000000002` is absorbed; a real fraction
/// like `1500.003` still moves to the next unit.
pub fn ceil_to_multiple(amount: f64, unit: f64) -> f64 {
    if amount <= 0.0 {
        return 0.0;
    }
    ((amount / unit) - CEIL_EPSILON).ceil().max(1.0) * unit
}

/// Duty for `gold_value` (destination currency) of `grams` through `channel`.
///
/// Precondition: inputs are finite and non-negative, `rules.rounding_unit > 0`.
pub fn duty(gold_value: f64, grams: f64, channel: Channel, rules: &CustomsRules) -> CustomsDuty {
    let exemption = rules.exemption_threshold;
    if gold_value <= exemption {
        return CustomsDuty {
            grams,
            gold_value,
            exemption_threshold: exemption,
            taxable_amount: 0.0,
            duty_rate_applied: 0.0,
            customs_duty: 0.0,
            gst_on_duty: 0.0,
            total_with_gst: 0.0,
            total_without_gst: 0.0,
            channel,
        };
    }

    let taxable = gold_value - exemption;
    let rate = rules.rate_for(channel);
    let duty = ceil_to_multiple(taxable * rate, rules.rounding_unit);

    let gst_raw = duty * rules.gst_on_duty_rate;
    let gst = match rules.gst_rounding {
        GstRounding::Ceil => ceil_to_multiple(gst_raw, rules.rounding_unit),
        GstRounding::Exact => gst_raw,
    };

    CustomsDuty {
        grams,
        gold_value,
        exemption_threshold: exemption,
        taxable_amount: taxable,
        duty_rate_applied: rate,
        customs_duty: duty,
        gst_on_duty: gst,
        total_with_gst: duty + gst,
        total_without_gst: duty,
        channel,
    }
}
