//! Error types for the firewall service.

use std::time::Duration;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("normalization error: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("heuristics branch error: {0}")]
    Heuristics(#[from] HeuristicsError),

    #[error("semantic branch error: {0}")]
    Semantic(#[from] SemanticError),

    #[error("safety NLP branch error: {0}")]
    SafetyNlp(#[from] SafetyNlpError),

    #[error("PII detector error: {0}")]
    Pii(#[from] PiiError),

    #[error("arbiter error: {0}")]
    Arbiter(#[from] ArbiterError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("event sink error: {0}")]
    EventSink(#[from] EventSinkError),

    #[error("orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("input invalid: {0}")]
    InputInvalid(String),
}

/// Configuration-related errors. `ConfigInvalid` per spec §7: fatal on
/// boot, rejected (with the previous snapshot retained) on hot-reload.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("branch weights must sum to 1.0, got {sum}")]
    WeightsDoNotSumToOne { sum: f64 },

    #[error("threshold inversion in {table}: {detail}")]
    ThresholdInversion { table: String, detail: String },

    #[error("unknown boost condition: {0}")]
    UnknownBoostCondition(String),

    #[error("pattern catalogue error: {0}")]
    Catalogue(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Normalizer errors. Never propagate past the Normalizer: a failure here
/// is recovered into the original text with no decoded layers.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("input exceeds maximum length: {length} > {max}")]
    TooLong { length: usize, max: usize },
}

/// Branch A errors. Runtime failures degrade the branch for the current
/// request and schedule a background catalogue reload.
#[derive(Debug, thiserror::Error)]
pub enum HeuristicsError {
    #[error("automaton not loaded")]
    AutomatonNotLoaded,

    #[error("catalogue corrupt: {0}")]
    CatalogueCorrupt(String),
}

/// Branch B errors.
#[derive(Debug, thiserror::Error)]
pub enum SemanticError {
    #[error("embedding provider failed: {0}")]
    Embedding(String),

    #[error("vector store unreachable: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("attack-side search failed")]
    AttackSideFailed,

    #[error("safe-side search failed, falling back to single-side scoring")]
    SafeSideFailedFallback,
}

/// Branch C errors.
#[derive(Debug, thiserror::Error)]
pub enum SafetyNlpError {
    #[error("classifier not loaded")]
    ModelNotLoaded,

    #[error("inference timed out after {0:?}")]
    Timeout(Duration),

    #[error("inference failed: {0}")]
    InferenceFailed(String),
}

/// PII detector errors.
#[derive(Debug, thiserror::Error)]
pub enum PiiError {
    #[error("NLP entity service unreachable: {0}")]
    NlpServiceUnreachable(String),

    #[error("invalid checksum input: {0}")]
    InvalidChecksumInput(String),
}

/// Arbiter errors. Should never occur at runtime (the arbiter is a pure
/// function of three well-formed BranchResults); present for config-time
/// validation failures surfaced through the arbiter's constructor.
#[derive(Debug, thiserror::Error)]
pub enum ArbiterError {
    #[error("invalid arbiter configuration: {0}")]
    InvalidConfig(String),
}

/// Vector store (egress) errors.
#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("query timed out after {0:?}")]
    Timeout(Duration),
}

/// Event sink (egress) errors. Never propagated to the caller; the event
/// sink is fire-and-forget best-effort.
#[derive(Debug, thiserror::Error)]
pub enum EventSinkError {
    #[error("queue full, dropped oldest event")]
    QueueFull,

    #[error("write failed: {0}")]
    WriteFailed(String),
}

/// Orchestrator errors.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("all branches degraded: {reason}")]
    AllBranchesDegraded { reason: String },
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::MissingEnvVar("VECTOR_STORE_HOST".to_string());
        let msg = err.to_string();
        assert!(msg.contains("VECTOR_STORE_HOST"), "{msg}");

        let err = ConfigError::WeightsDoNotSumToOne { sum: 0.91 };
        assert!(err.to_string().contains("0.91"));

        let err = ConfigError::InvalidValue {
            key: "arbiter.block_score".to_string(),
            message: "must be in 0..100".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("arbiter.block_score"));
        assert!(msg.contains("must be in 0..100"));
    }

    #[test]
    fn semantic_error_display() {
        let err = SemanticError::AttackSideFailed;
        assert!(err.to_string().contains("attack-side"));
    }

    #[test]
    fn top_level_error_from_conversions() {
        let config_err = ConfigError::MissingEnvVar("X".to_string());
        let err: Error = config_err.into();
        assert!(matches!(err, Error::Config(_)));

        let vs_err = VectorStoreError::Http("connection refused".to_string());
        let err: Error = vs_err.into();
        assert!(matches!(err, Error::VectorStore(_)));

        let sem_err: SemanticError = VectorStoreError::Timeout(Duration::from_millis(25)).into();
        assert!(matches!(sem_err, SemanticError::VectorStore(_)));
    }

    #[test]
    fn input_invalid_is_distinct_from_recovered_errors() {
        let err = Error::InputInvalid("text required".to_string());
        assert!(err.to_string().contains("text required"));
    }
}
