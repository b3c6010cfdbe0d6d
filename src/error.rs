//! Error taxonomy for the price pipeline.
//!
//! Source-local failures ([`SourceFailure`]) never leave the aggregator: a source
//! that fails is simply absent from the snapshot. [`PipelineError`] is reserved for
//! conditions that make a meaningful report impossible and is propagated to the
//! caller of the whole run.

use thiserror::Error;

/// `extract_numeric` found no numeric token in the input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("no numeric token in {0:?}")]
    NotFound(String),
}

/// Why a single source produced no quote this run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceFailure {
    /// Markup was retrieved but no probe yielded a denomination.
    #[error("[{source_id}] no price found: {detail}")]
    ExtractionNotFound { source_id: String, detail: String },

    /// Transport error, non-2xx status, timeout or render wait expiry.
    #[error("[{source_id}] unreachable: {detail}")]
    SourceUnreachable { source_id: String, detail: String },
}

impl SourceFailure {
    pub fn not_found(source_id: &str, detail: impl Into<String>) -> Self {
        Self::ExtractionNotFound {
            source_id: source_id.to_string(),
            detail: detail.into(),
        }
    }

    pub fn unreachable(source_id: &str, detail: impl Into<String>) -> Self {
        Self::SourceUnreachable {
            source_id: source_id.to_string(),
            detail: detail.into(),
        }
    }

    pub fn source_id(&self) -> &str {
        match self {
            Self::ExtractionNotFound { source_id, .. } | Self::SourceUnreachable { source_id, .. } => {
                source_id
            }
        }
    }

    /// Short label for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExtractionNotFound { .. } => "not_found",
            Self::SourceUnreachable { .. } => "unreachable",
        }
    }
}

/// Failures fatal to the run (or, for preconditions, to the offending call).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required rate/threshold constant is missing or out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The caller passed a value the derivation engine does not accept
    /// (e.g. a non-positive quantity).
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    #[error("report storage: {0}")]
    Io(#[from] std::io::Error),

    #[error("report serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_failure_exposes_id_and_kind() {
        let e = SourceFailure::unreachable("bhima", "timeout after 10s");
        assert_eq!(e.source_id(), "bhima");
        assert_eq!(e.kind(), "unreachable");
        assert_eq!(e.to_string(), "[bhima] unreachable: timeout after 10s");

        let e = SourceFailure::not_found("candere", "no probe matched");
        assert_eq!(e.kind(), "not_found");
    }
}
