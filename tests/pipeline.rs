// tests/pipeline.rs
//
// Collect → derive → assemble with stub sources: partial failures, the empty
// run, and byte-identical re-assembly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use karatmeter::config::AppConfig;
use karatmeter::derive::{derive_all, CalculationConstants, Derivation};
use karatmeter::error::{PipelineError, SourceFailure};
use karatmeter::extract::{DenominationTable, Karat};
use karatmeter::ingest::collect;
use karatmeter::ingest::types::{PriceQuote, PriceSource, QuoteMeta};
use karatmeter::report::{assemble_at, generate};

enum Behaviour {
    Quote(DenominationTable, QuoteMeta),
    Unreachable,
    NotFound,
    Hang,
}

struct Stub {
    id: &'static str,
    behaviour: Behaviour,
}

#[async_trait]
impl PriceSource for Stub {
    async fn fetch_quote(&self) -> Result<PriceQuote, SourceFailure> {
        match &self.behaviour {
            Behaviour::Quote(t, meta) => PriceQuote::new(self.id, t.clone(), meta, Utc::now())
                .ok_or_else(|| SourceFailure::not_found(self.id, "empty")),
            Behaviour::Unreachable => Err(SourceFailure::unreachable(self.id, "connection refused")),
            Behaviour::NotFound => Err(SourceFailure::not_found(self.id, "no probe matched")),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(SourceFailure::unreachable(self.id, "unreachable after sleep"))
            }
        }
    }

    fn id(&self) -> &str {
        self.id
    }
}

fn stub(id: &'static str, behaviour: Behaviour) -> Arc<dyn PriceSource> {
    Arc::new(Stub { id, behaviour })
}

fn four_sources_two_failing() -> Vec<Arc<dyn PriceSource>> {
    vec![
        stub(
            "joy_alukkas",
            Behaviour::Quote(
                DenominationTable::from([(Karat::K24, 231.75), (Karat::K22, 212.5)]),
                QuoteMeta::UAE,
            ),
        ),
        stub("kalyan", Behaviour::Unreachable),
        stub("bhima", Behaviour::NotFound),
        stub(
            "candere",
            Behaviour::Quote(
                DenominationTable::from([(Karat::K24, 68130.0), (Karat::K22, 62450.0)]),
                QuoteMeta::KERALA,
            ),
        ),
    ]
}

#[tokio::test]
async fn failures_are_absent_not_fatal() {
    let snap = collect(&four_sources_two_failing(), Duration::from_secs(5)).await;
    assert_eq!(snap.len(), 2);
    assert!(snap.get("joy_alukkas").is_some());
    assert!(snap.get("candere").is_some());
    assert!(snap.get("kalyan").is_none());
    assert!(snap.get("bhima").is_none());
}

#[tokio::test(start_paused = true)]
async fn a_hanging_source_does_not_stall_the_run() {
    let mut sources = four_sources_two_failing();
    sources.push(stub("goldapi", Behaviour::Hang));
    let snap = collect(&sources, Duration::from_secs(10)).await;
    assert_eq!(snap.len(), 2);
    assert!(snap.get("goldapi").is_none());
}

#[tokio::test]
async fn report_covers_only_what_was_collected() {
    let cfg = AppConfig::default();
    let doc = generate(&four_sources_two_failing(), &cfg).await.unwrap();

    assert_eq!(doc.sources.len(), 2);
    let keys: Vec<&str> = doc.calculations.keys().map(String::as_str).collect();
    assert!(keys.contains(&"joy_alukkas_22k_8g"));
    assert!(keys.contains(&"candere_22k_20g"));
    assert!(keys.contains(&"customs_16g_green"));
    assert!(!keys.iter().any(|k| k.starts_with("kalyan") || k.starts_with("bhima")));

    // 8 g sovereign, Gulf: 212.5 * 8 = 1700; +8 % making; +5 % VAT on base.
    let Derivation::Sovereign(joy) = &doc.calculations["joy_alukkas_22k_8g"] else {
        panic!("expected sovereign pricing");
    };
    assert!((joy.total - 1921.0).abs() < 1e-9);

    // 16 g of 6245/g = 99 920 → taxable 49 920 → red 6 % = 2995.2 → 3000.
    let Derivation::Customs(red) = &doc.calculations["customs_16g_red"] else {
        panic!("expected customs");
    };
    assert_eq!(red.customs_duty, 3000.0);
    assert_eq!(red.gst_on_duty, 150.0);
}

#[tokio::test]
async fn zero_successful_sources_still_produce_a_report() {
    let sources = vec![
        stub("kalyan", Behaviour::Unreachable),
        stub("bhima", Behaviour::NotFound),
    ];
    let doc = generate(&sources, &AppConfig::default()).await.unwrap();
    assert!(doc.sources.is_empty());
    assert!(doc.calculations.is_empty());

    let json: serde_json::Value = serde_json::to_value(&doc).unwrap();
    assert!(json["sources"].as_object().unwrap().is_empty());
    assert!(json["calculations"].as_object().unwrap().is_empty());
    assert!(json["created_at"].is_string());
}

#[tokio::test]
async fn invalid_constants_fail_the_run() {
    let mut cfg = AppConfig::default();
    cfg.calculations.customs.rounding_unit = 0.0;
    let err = generate(&four_sources_two_failing(), &cfg).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidConfiguration(_)));
}

#[tokio::test]
async fn assembling_twice_is_byte_identical() {
    let snap = collect(&four_sources_two_failing(), Duration::from_secs(5)).await;
    let derivations = derive_all(&snap, &CalculationConstants::default()).unwrap();

    let t1 = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
    let t2 = Utc.with_ymd_and_hms(2025, 3, 1, 9, 45, 0).unwrap();
    let a = serde_json::to_string_pretty(&assemble_at(&snap, &derivations, t1)).unwrap();
    let b = serde_json::to_string_pretty(&assemble_at(&snap, &derivations, t1)).unwrap();
    assert_eq!(a, b);

    // Only the capture timestamp differs between two assemblies.
    let c = serde_json::to_string_pretty(&assemble_at(&snap, &derivations, t2)).unwrap();
    assert_ne!(a, c);
    let strip = |s: &str| {
        s.lines()
            .filter(|l| !l.trim_start().starts_with("\"created_at\""))
            .collect::<Vec<_>>()
            .join("\n")
    };
    assert_eq!(strip(&a), strip(&c));
}

#[tokio::test]
async fn reported_money_is_rounded_to_cents() {
    let sources = vec![stub(
        "candere",
        Behaviour::Quote(
            DenominationTable::from([(Karat::K22, 73290.7)]),
            QuoteMeta::KERALA,
        ),
    )];
    let doc = generate(&sources, &AppConfig::default()).await.unwrap();
    let json = serde_json::to_value(&doc).unwrap();
    let base = json["calculations"]["candere_22k_8g"]["base_price"]
        .as_f64()
        .unwrap();
    // 7329.07 * 8 = 58632.56 (float noise removed on output)
    assert_eq!(base, 58632.56);
}
