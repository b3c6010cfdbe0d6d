// src/report.rs
//! Report assembly and the on-disk report store.
//!
//! A report is written once, as pretty JSON named after its creation time, and
//! never touched again. Listing and retrieval only read.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::derive::{derive_all, Derivations};
use crate::error::PipelineError;
use crate::ingest::types::{PriceQuote, PriceSnapshot, PriceSource};

pub const REPORT_PREFIX: &str = "gold_report_";
const NAME_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub created_at: DateTime<Utc>,
    pub sources: BTreeMap<String, PriceQuote>,
    pub calculations: Derivations,
}

impl ReportDocument {
    pub fn file_name(&self) -> String {
        format!("{REPORT_PREFIX}{}.json", self.created_at.format(NAME_TIME_FORMAT))
    }
}

/// Merge a snapshot and its derivations. Nothing is recomputed.
pub fn assemble(snapshot: &PriceSnapshot, derivations: &Derivations) -> ReportDocument {
    assemble_at(snapshot, derivations, Utc::now())
}

pub fn assemble_at(
    snapshot: &PriceSnapshot,
    derivations: &Derivations,
    created_at: DateTime<Utc>,
) -> ReportDocument {
    ReportDocument {
        created_at,
        sources: snapshot.quotes().clone(),
        calculations: derivations.clone(),
    }
}

/// Collect, derive, assemble. Constants are checked before any network work so
/// a bad configuration fails fast; source failures only shrink the report.
pub async fn generate(
    sources: &[Arc<dyn PriceSource>],
    cfg: &AppConfig,
) -> Result<ReportDocument, PipelineError> {
    cfg.calculations.validate()?;
    let snapshot = crate::ingest::collect(sources, cfg.fetch.source_deadline()).await;
    let derivations = derive_all(&snapshot, &cfg.calculations)?;
    Ok(assemble(&snapshot, &derivations))
}

/// Listing row for one stored report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub sources_count: usize,
}

#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write `doc` under its timestamp name. An existing file with that name is
    /// an error (`AlreadyExists`), never overwritten; the API answers it with 409.
    pub fn persist(&self, doc: &ReportDocument) -> Result<PathBuf, PipelineError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(doc.file_name());
        let body = serde_json::to_vec_pretty(doc)?;
        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        file.write_all(&body)?;
        file.sync_all()?;
        tracing::info!(path = %path.display(), sources = doc.sources.len(), "report saved");
        Ok(path)
    }

    /// Newest first, at most `limit`. Unreadable files are skipped with a warning.
    pub fn list(&self, limit: usize) -> Result<Vec<ReportEntry>, PipelineError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|n| n.starts_with(REPORT_PREFIX) && n.ends_with(".json"))
            .collect();
        // The timestamp in the name sorts lexicographically.
        names.sort_unstable_by(|a, b| b.cmp(a));

        let mut out = Vec::new();
        for name in names {
            if out.len() >= limit {
                break;
            }
            match self.load(&name) {
                Ok(doc) => out.push(ReportEntry {
                    sources_count: doc.sources.len(),
                    created_at: doc.created_at,
                    name,
                }),
                Err(e) => tracing::warn!(error = %e, report = %name, "skipping unreadable report"),
            }
        }
        Ok(out)
    }

    /// Read one report by file name. Names that could leave the report
    /// directory are rejected.
    pub fn load(&self, name: &str) -> Result<ReportDocument, PipelineError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(PipelineError::PreconditionViolation(format!(
                "invalid report name {name:?}"
            )));
        }
        let bytes = fs::read(self.dir.join(name))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
