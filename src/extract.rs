//! Price extraction from noisy page markup.
//!
//! Two layers:
//! - [`extract_numeric`] pulls the first number out of a text fragment such as
//!   `"₹ 62,450.00/10gm"` or `"AED 245.50 /gram"`.
//! - [`extract_denomination_table`] runs an ordered list of structural [`Probe`]s over
//!   a parsed document. The first probe that yields at least one denomination wins;
//!   later probes are not consulted, so reads from different page layouts are never
//!   merged.
//!
//! Label matching is loose: a label is accepted when its lower-cased text
//! *contains* "24", "22" or "18" (checked in that order). "24 Karat", "24K" and
//! "Gold 24kt" all map to [`Karat::K24`]; so would an accidental "124".

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

/// Gold purity grade with its own quoted price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Karat {
    #[serde(rename = "24k")]
    K24,
    #[serde(rename = "22k")]
    K22,
    #[serde(rename = "18k")]
    K18,
}

impl Karat {
    /// Recognition order matters: "24" is tested before "22" before "18".
    pub const ALL: [Karat; 3] = [Karat::K24, Karat::K22, Karat::K18];

    pub fn grade(self) -> u32 {
        match self {
            Karat::K24 => 24,
            Karat::K22 => 22,
            Karat::K18 => 18,
        }
    }

    /// Fraction of pure gold relative to 24 karat (22k → 22/24).
    pub fn purity(self) -> f64 {
        f64::from(self.grade()) / 24.0
    }

    pub fn key(self) -> &'static str {
        match self {
            Karat::K24 => "24k",
            Karat::K22 => "22k",
            Karat::K18 => "18k",
        }
    }

    /// Map an arbitrary site label ("24 Karat", "22KT Gold") to a grade.
    pub fn recognize(label: &str) -> Option<Karat> {
        let lower = label.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| lower.contains(&k.grade().to_string()))
    }
}

impl fmt::Display for Karat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Karat {
    type Err = String;

    /// Strict parse for configuration values: "22k", "22K", "22".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim().to_ascii_lowercase();
        let digits = t.strip_suffix('k').unwrap_or(&t);
        Self::ALL
            .into_iter()
            .find(|k| k.grade().to_string() == digits)
            .ok_or_else(|| format!("unknown denomination {s:?} (expected 24k, 22k or 18k)"))
    }
}

/// Denomination → amount, ordered for deterministic serialization.
pub type DenominationTable = BTreeMap<Karat, f64>;

static RE_UNIT_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:/|per)\s*(?:10\s*gms?|10\s*grams?|10\s*g|grams?|gms?|g)\b").unwrap()
});
static RE_CURRENCY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)₹|\baed\b|\binr\b|\busd\b|\brs\.?|\$|د\.إ").unwrap());
static RE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());
static RE_KARAT_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:24|22|18)\s*(?:karat|carat|kt|ct|k)\b").unwrap()
});
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// First decimal-or-integer number in `text` after removing currency markers,
/// thousand separators and unit suffixes.
///
/// ```
/// # use karatmeter::extract::extract_numeric;
/// assert_eq!(extract_numeric("₹ 62,450.00/10gm").unwrap(), 62450.0);
/// ```
pub fn extract_numeric(text: &str) -> Result<f64, ExtractError> {
    let cleaned = RE_UNIT_SUFFIX.replace_all(text, " ");
    let cleaned = RE_CURRENCY.replace_all(&cleaned, " ");
    let cleaned = cleaned.replace(',', "");

    RE_NUMBER
        .find(&cleaned)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .ok_or_else(|| ExtractError::NotFound(text.trim().to_string()))
}

/// Positive amount or nothing; zero and unparsable values are dropped.
fn positive_amount(text: &str) -> Option<f64> {
    extract_numeric(text).ok().filter(|v| *v > 0.0)
}

/// Visible text of an element with whitespace collapsed.
pub fn element_text(el: ElementRef<'_>) -> String {
    let joined = el.text().collect::<Vec<_>>().join(" ");
    RE_WS.replace_all(&joined, " ").trim().to_string()
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid probe selector {css:?}: {e:?}"))
}

type ProbeFn = dyn Fn(&Html) -> DenominationTable + Send + Sync;

/// One structural strategy for locating price data in a document.
///
/// Probes are plain function values; an adapter holds an ordered `Vec<Probe>`.
/// The built-in constructors take CSS selectors that are constants of the adapter
/// and panic on a malformed selector.
#[derive(Clone)]
pub struct Probe {
    name: String,
    run: Arc<ProbeFn>,
}

impl fmt::Debug for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Probe").field("name", &self.name).finish()
    }
}

impl Probe {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Html) -> DenominationTable + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            run: Arc::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, doc: &Html) -> DenominationTable {
        (self.run)(doc)
    }

    /// Label/amount pairs from the first two cells of every row matched by
    /// `row_selector` (e.g. `"#myModal table tr"`).
    pub fn table_rows(row_selector: &str) -> Self {
        Self::table_rows_above(row_selector, 0.0)
    }

    /// Like [`Probe::table_rows`], but amounts not strictly above `floor` are
    /// treated as noise (a "24" inside a header cell, a percentage, ...).
    pub fn table_rows_above(row_selector: &str, floor: f64) -> Self {
        let rows = selector(row_selector);
        let cells = selector("td, th");
        Self::new(format!("rows({row_selector})"), move |doc| {
            let mut table = DenominationTable::new();
            for row in doc.select(&rows) {
                let row_cells: Vec<_> = row.select(&cells).collect();
                if row_cells.len() < 2 {
                    continue;
                }
                let Some(karat) = Karat::recognize(&element_text(row_cells[0])) else {
                    continue;
                };
                if let Some(amount) = positive_amount(&element_text(row_cells[1])) {
                    if amount > floor {
                        table.entry(karat).or_insert(amount);
                    }
                }
            }
            table
        })
    }

    /// Elements matched by `element_selector` whose label names a karat.
    ///
    /// With `label_selector`, the label is the text of that child and the amount is
    /// read from the remaining text. Without it, the karat token itself
    /// ("22K", "24 Karat") is removed before reading the amount.
    pub fn labelled(element_selector: &str, label_selector: Option<&str>) -> Self {
        let elements = selector(element_selector);
        let label = label_selector.map(selector);
        let name = match label_selector {
            Some(l) => format!("labelled({element_selector} / {l})"),
            None => format!("labelled({element_selector})"),
        };
        Self::new(name, move |doc| {
            let mut table = DenominationTable::new();
            for el in doc.select(&elements) {
                let full = element_text(el);
                let (label_text, amount_text) = match &label {
                    Some(sel) => {
                        let Some(l) = el.select(sel).next() else {
                            continue;
                        };
                        let l = element_text(l);
                        let rest = full.replacen(&l, " ", 1);
                        (l, rest)
                    }
                    None => {
                        // Prefer the karat token so digits of the amount ("248.50")
                        // cannot be read as a grade.
                        let label = RE_KARAT_TOKEN
                            .find(&full)
                            .map(|m| m.as_str().to_string())
                            .unwrap_or_else(|| full.clone());
                        (label, RE_KARAT_TOKEN.replace_all(&full, " ").into_owned())
                    }
                };
                let Some(karat) = Karat::recognize(&label_text) else {
                    continue;
                };
                if let Some(amount) = positive_amount(&amount_text) {
                    table.entry(karat).or_insert(amount);
                }
            }
            table
        })
    }

    /// Explicit selector per denomination; the first element each selector
    /// matches holds that denomination's amount. A karat token inside the
    /// element ("22K Gold ₹ 61,630") is ignored.
    pub fn positional(slots: &[(&str, Karat)]) -> Self {
        let compiled: Vec<(Selector, Karat)> =
            slots.iter().map(|(css, k)| (selector(css), *k)).collect();
        let name = format!(
            "positional({})",
            slots.iter().map(|(_, k)| k.key()).collect::<Vec<_>>().join(",")
        );
        Self::new(name, move |doc| {
            let mut table = DenominationTable::new();
            for (sel, karat) in &compiled {
                if let Some(amount) = doc
                    .select(sel)
                    .next()
                    .and_then(|el| {
                        positive_amount(&RE_KARAT_TOKEN.replace_all(&element_text(el), " "))
                    })
                {
                    table.entry(*karat).or_insert(amount);
                }
            }
            table
        })
    }
}

/// Apply `probes` in order; the first non-empty table wins.
/// An empty result means no probe matched.
pub fn extract_denomination_table(doc: &Html, probes: &[Probe]) -> DenominationTable {
    for probe in probes {
        let table = probe.apply(doc);
        if !table.is_empty() {
            tracing::debug!(probe = probe.name(), found = table.len(), "probe matched");
            return table;
        }
    }
    DenominationTable::new()
}

/// Parse `markup` and run the probe list over it.
pub fn extract_from_markup(markup: &str, probes: &[Probe]) -> DenominationTable {
    let doc = Html::parse_document(markup);
    extract_denomination_table(&doc, probes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_from_noisy_strings() {
        assert_eq!(extract_numeric("₹ 62,450.00/10gm").unwrap(), 62450.0);
        assert_eq!(extract_numeric("AED 245.50 /gram").unwrap(), 245.5);
        assert_eq!(extract_numeric("  245.50AED  ").unwrap(), 245.5);
        assert_eq!(extract_numeric("Rs.5,712 / gm").unwrap(), 5712.0);
        assert_eq!(extract_numeric("\t₹\u{a0}6,245\n").unwrap(), 6245.0);
        assert_eq!(extract_numeric("/10gm ₹ 62450").unwrap(), 62450.0);
    }

    #[test]
    fn numeric_not_found() {
        let err = extract_numeric("  AED -- /gram ").unwrap_err();
        assert!(matches!(err, ExtractError::NotFound(_)));
        assert!(extract_numeric("").is_err());
    }

    #[test]
    fn karat_recognition_is_substring_based() {
        assert_eq!(Karat::recognize("24 Karat"), Some(Karat::K24));
        assert_eq!(Karat::recognize("22KT"), Some(Karat::K22));
        assert_eq!(Karat::recognize("Gold 18k"), Some(Karat::K18));
        assert_eq!(Karat::recognize("Platinum"), None);
        // compatibility: containment, not tokenization
        assert_eq!(Karat::recognize("124"), Some(Karat::K24));
    }

    #[test]
    fn karat_parses_config_values() {
        assert_eq!("22k".parse::<Karat>().unwrap(), Karat::K22);
        assert_eq!("24K".parse::<Karat>().unwrap(), Karat::K24);
        assert_eq!("18".parse::<Karat>().unwrap(), Karat::K18);
        assert!("21k".parse::<Karat>().is_err());
        assert!((Karat::K22.purity() - 22.0 / 24.0).abs() < 1e-12);
    }

    #[test]
    fn table_rows_skip_unknown_labels() {
        let html = r#"<table>
            <tr><th>Karat</th><th>Price</th></tr>
            <tr><td>24 Karat</td><td>AED 245.50</td></tr>
            <tr><td>Silver</td><td>AED 3.10</td></tr>
            <tr><td> 22K </td><td>AED 227,25</td></tr>
        </table>"#;
        let t = extract_from_markup(html, &[Probe::table_rows("table tr")]);
        assert_eq!(t.len(), 2);
        assert_eq!(t[&Karat::K24], 245.5);
        assert_eq!(t[&Karat::K22], 22725.0);
    }

    #[test]
    fn floor_drops_implausible_amounts() {
        let html = r#"<table>
            <tr><td>24K</td><td>24</td></tr>
            <tr><td>22K</td><td>AED 227.25</td></tr>
        </table>"#;
        let t = extract_from_markup(html, &[Probe::table_rows_above("table tr", 150.0)]);
        assert_eq!(t.len(), 1);
        assert_eq!(t[&Karat::K22], 227.25);
    }

    #[test]
    fn labelled_elements_with_and_without_label_child() {
        let html = r#"<div class="priceBlock">
            <div class="modalClass"><label>24 KT</label><span>AED 245.50</span></div>
            <div class="modalClass"><label>22 KT</label><span>AED 227.25</span></div>
        </div>
        <p class="gold-price">18K Gold AED 186.00</p>"#;
        let doc = Html::parse_document(html);

        let t = Probe::labelled(".priceBlock .modalClass", Some("label")).apply(&doc);
        assert_eq!(t[&Karat::K24], 245.5);
        assert_eq!(t[&Karat::K22], 227.25);

        let t = Probe::labelled("[class*=price]", None).apply(&doc);
        assert_eq!(t.get(&Karat::K18), Some(&186.0));
    }

    #[test]
    fn amount_digits_do_not_decide_the_grade() {
        let html = r#"<div class="card-price">22K AED 248.50</div>"#;
        let t = extract_from_markup(html, &[Probe::labelled("[class*=price]", None)]);
        assert_eq!(t.len(), 1);
        assert_eq!(t[&Karat::K22], 248.5);
    }

    #[test]
    fn positional_selectors() {
        let html = r#"<div class="goldCard goldCard--one"><p class="goldCard--rate">₹ 68,130</p></div>
                      <div class="goldCard goldCard--two"><p class="goldCard--rate">₹ 62,450</p></div>"#;
        let t = extract_from_markup(
            html,
            &[Probe::positional(&[
                (".goldCard--one .goldCard--rate", Karat::K24),
                (".goldCard--two .goldCard--rate", Karat::K22),
            ])],
        );
        assert_eq!(t[&Karat::K24], 68130.0);
        assert_eq!(t[&Karat::K22], 62450.0);
    }

    #[test]
    fn first_success_wins_and_near_misses_are_ignored() {
        // Probe 1 finds rows but none with a karat label, probe 2 finds nothing,
        // probe 3 matches, probe 4 would match too but must not be consulted.
        let html = r#"
            <table id="rates"><tr><td>Silver</td><td>3.10</td></tr></table>
            <ul class="cards"><li class="rate">22K AED 227.25</li></ul>
            <div id="late"><table><tr><td>24K</td><td>999.00</td></tr></table></div>"#;
        let probes = vec![
            Probe::table_rows("#rates tr"),
            Probe::table_rows("#missing tr"),
            Probe::labelled(".cards .rate", None),
            Probe::table_rows("#late tr"),
        ];
        let t = extract_from_markup(html, &probes);
        assert_eq!(t.len(), 1);
        assert_eq!(t[&Karat::K22], 227.25);
        assert!(!t.contains_key(&Karat::K24));
    }

    #[test]
    fn nothing_matches_yields_empty_table() {
        let t = extract_from_markup("<html><body>maintenance</body></html>", &[
            Probe::table_rows("table tr"),
            Probe::labelled("[class*=price]", None),
        ]);
        assert!(t.is_empty());
    }

    #[test]
    fn custom_probe_functions_compose() {
        let probes = vec![
            Probe::new("never", |_| DenominationTable::new()),
            Probe::new("fixed", |_| DenominationTable::from([(Karat::K24, 1.0)])),
        ];
        let t = extract_from_markup("<p/>", &probes);
        assert_eq!(t[&Karat::K24], 1.0);
    }
}
