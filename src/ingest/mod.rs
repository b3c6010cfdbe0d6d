// src/ingest/mod.rs
pub mod fetch;
pub mod providers;
pub mod render;
pub mod types;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use tokio::task::JoinSet;

use crate::error::SourceFailure;
use crate::ingest::types::{PriceQuote, PriceSnapshot, PriceSource};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_quotes_total", "Quotes collected from sources.");
        describe_counter!(
            "ingest_source_errors_total",
            "Source failures, labelled by source and kind."
        );
        describe_histogram!("ingest_fetch_ms", "Per-source retrieval time in milliseconds.");
        describe_gauge!("ingest_last_run_ts", "Unix ts when collection last ran.");
    });
}

/// Outcome of one source within a collection pass.
#[derive(Debug)]
pub struct SourceOutcome {
    pub source_id: String,
    pub result: Result<PriceQuote, SourceFailure>,
    pub elapsed: Duration,
}

async fn fetch_bounded(
    source: Arc<dyn PriceSource>,
    deadline: Duration,
) -> Result<PriceQuote, SourceFailure> {
    match tokio::time::timeout(deadline, source.fetch_quote()).await {
        Ok(res) => res,
        Err(_) => Err(SourceFailure::unreachable(
            source.id(),
            format!("no answer within {deadline:?}"),
        )),
    }
}

fn record(outcome: &SourceOutcome) {
    histogram!("ingest_fetch_ms", "source" => outcome.source_id.clone())
        .record(outcome.elapsed.as_secs_f64() * 1000.0);
    match &outcome.result {
        Ok(q) => {
            counter!("ingest_quotes_total", "source" => outcome.source_id.clone()).increment(1);
            tracing::info!(
                source = %outcome.source_id,
                denominations = q.prices().len(),
                ms = outcome.elapsed.as_millis() as u64,
                "quote collected"
            );
        }
        Err(e) => {
            counter!(
                "ingest_source_errors_total",
                "source" => outcome.source_id.clone(),
                "kind" => e.kind()
            )
            .increment(1);
            tracing::warn!(error = %e, source = %outcome.source_id, "source failed");
        }
    }
}

/// Query every source concurrently, each bounded by `deadline`. Outcomes come
/// back in the order of `sources`, whatever order they finished in.
///
/// Dropping the returned future aborts the in-flight retrievals.
pub async fn collect_outcomes(
    sources: &[Arc<dyn PriceSource>],
    deadline: Duration,
) -> Vec<SourceOutcome> {
    ensure_metrics_described();

    let mut set = JoinSet::new();
    for (idx, src) in sources.iter().enumerate() {
        let src = Arc::clone(src);
        set.spawn(async move {
            let id = src.id().to_string();
            let started = Instant::now();
            let result = fetch_bounded(src, deadline).await;
            (
                idx,
                SourceOutcome {
                    source_id: id,
                    result,
                    elapsed: started.elapsed(),
                },
            )
        });
    }

    let mut done: Vec<(usize, SourceOutcome)> = Vec::with_capacity(sources.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(pair) => done.push(pair),
            Err(e) => tracing::error!(error = %e, "source task aborted"),
        }
    }
    done.sort_by_key(|(idx, _)| *idx);
    done.into_iter().map(|(_, o)| o).collect()
}

/// One collection pass: every failure is logged and counted, only successful
/// quotes land in the snapshot. A pass where everything fails yields an empty
/// snapshot, never an error.
pub async fn collect(sources: &[Arc<dyn PriceSource>], deadline: Duration) -> PriceSnapshot {
    let retrieved_at = Utc::now();
    let outcomes = collect_outcomes(sources, deadline).await;
    for o in &outcomes {
        record(o);
    }
    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    gauge!("ingest_last_run_ts").set(retrieved_at.timestamp().max(0) as f64);

    let snapshot = PriceSnapshot::from_quotes(
        retrieved_at,
        outcomes.into_iter().filter_map(|o| o.result.ok()),
    );
    tracing::info!(
        collected = snapshot.len(),
        failed,
        "collection pass finished"
    );
    snapshot
}

/// Single-source retrieval with the same deadline and telemetry as [`collect`].
pub async fn collect_one(
    source: Arc<dyn PriceSource>,
    deadline: Duration,
) -> Result<PriceQuote, SourceFailure> {
    ensure_metrics_described();
    let started = Instant::now();
    let source_id = source.id().to_string();
    let outcome = SourceOutcome {
        source_id,
        result: fetch_bounded(source, deadline).await,
        elapsed: started.elapsed(),
    };
    record(&outcome);
    outcome.result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{DenominationTable, Karat};
    use crate::ingest::types::QuoteMeta;
    use async_trait::async_trait;

    struct Slow {
        id: &'static str,
        delay_ms: u64,
    }

    #[async_trait]
    impl PriceSource for Slow {
        async fn fetch_quote(&self) -> Result<PriceQuote, SourceFailure> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            PriceQuote::new(
                self.id,
                DenominationTable::from([(Karat::K22, 200.0)]),
                &QuoteMeta::UAE,
                Utc::now(),
            )
            .ok_or_else(|| SourceFailure::not_found(self.id, "empty"))
        }
        fn id(&self) -> &str {
            self.id
        }
    }

    #[tokio::test(start_paused = true)]
    async fn outcomes_keep_input_order() {
        let sources: Vec<Arc<dyn PriceSource>> = vec![
            Arc::new(Slow { id: "a", delay_ms: 30 }),
            Arc::new(Slow { id: "b", delay_ms: 10 }),
            Arc::new(Slow { id: "c", delay_ms: 20 }),
        ];
        let out = collect_outcomes(&sources, Duration::from_secs(1)).await;
        let ids: Vec<_> = out.iter().map(|o| o.source_id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_turns_into_unreachable() {
        let sources: Vec<Arc<dyn PriceSource>> = vec![
            Arc::new(Slow { id: "fast", delay_ms: 5 }),
            Arc::new(Slow { id: "stuck", delay_ms: 60_000 }),
        ];
        let snap = collect(&sources, Duration::from_secs(2)).await;
        assert_eq!(snap.len(), 1);
        assert!(snap.get("fast").is_some());

        let err = collect_one(Arc::new(Slow { id: "stuck", delay_ms: 60_000 }), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unreachable");
        assert_eq!(err.source_id(), "stuck");
    }
}
