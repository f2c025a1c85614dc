//! Gate error taxonomy
//!
//! Every failure the gate can surface carries an [`ErrorKind`]. Context
//! wrappers (such as the fact id a provider error came from) never change
//! the kind, so callers classify with [`GateError::is`] after any amount of
//! wrapping.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Classification of a gate failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Remote or backing source unreachable, or returned a non-success status
    FactSourceUnavailable,
    /// A collected fact was older than the configured maximum age
    FactStale,
    /// A fact source answered with a body that could not be decoded
    FactDecode,
    /// The evaluator could not run, or its result had the wrong shape
    PolicyEvaluation,
    /// The policy source could not be read or compiled
    PolicyLoad,
    /// The backing configuration could not be loaded
    ConfigLoad,
    /// Opaque provider failure
    Provider,
    /// The audit sink could not record an entry
    Audit,
}

impl ErrorKind {
    /// Stable label used for metrics and audit records
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::FactSourceUnavailable => "fact_source_unavailable",
            ErrorKind::FactStale => "fact_stale",
            ErrorKind::FactDecode => "fact_decode",
            ErrorKind::PolicyEvaluation => "policy_evaluation",
            ErrorKind::PolicyLoad => "policy_load",
            ErrorKind::ConfigLoad => "config_load",
            ErrorKind::Provider => "provider",
            ErrorKind::Audit => "audit",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gate errors
#[derive(Debug, Clone, Error)]
pub enum GateError {
    #[error("fact source unavailable: {0}")]
    FactSourceUnavailable(String),

    #[error("fact data is stale: {fact_id} is {}ms old (max {}ms)", .age.as_millis(), .max_age.as_millis())]
    FactStale {
        fact_id: String,
        age: Duration,
        max_age: Duration,
    },

    #[error("decoding fact response: {0}")]
    FactDecode(String),

    #[error("policy evaluation failed: {0}")]
    PolicyEvaluation(String),

    #[error("policy bundle could not be loaded: {0}")]
    PolicyLoad(String),

    #[error("configuration could not be loaded: {0}")]
    ConfigLoad(String),

    #[error("{0}")]
    Provider(String),

    #[error("audit sink failed: {0}")]
    Audit(String),

    #[error("collecting fact {fact_id}: {source}")]
    Collect {
        fact_id: String,
        #[source]
        source: Box<GateError>,
    },
}

impl GateError {
    /// Wrap an error with the id of the fact whose collection produced it
    pub fn collecting(fact_id: impl Into<String>, source: GateError) -> Self {
        GateError::Collect {
            fact_id: fact_id.into(),
            source: Box::new(source),
        }
    }

    /// Kind of the innermost classified error
    pub fn kind(&self) -> ErrorKind {
        match self {
            GateError::FactSourceUnavailable(_) => ErrorKind::FactSourceUnavailable,
            GateError::FactStale { .. } => ErrorKind::FactStale,
            GateError::FactDecode(_) => ErrorKind::FactDecode,
            GateError::PolicyEvaluation(_) => ErrorKind::PolicyEvaluation,
            GateError::PolicyLoad(_) => ErrorKind::PolicyLoad,
            GateError::ConfigLoad(_) => ErrorKind::ConfigLoad,
            GateError::Provider(_) => ErrorKind::Provider,
            GateError::Audit(_) => ErrorKind::Audit,
            GateError::Collect { source, .. } => source.kind(),
        }
    }

    /// Whether this error, after any context wrapping, is of `kind`
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }

    /// Fact id this error was attributed to, if any
    pub fn fact_id(&self) -> Option<&str> {
        match self {
            GateError::Collect { fact_id, .. } => Some(fact_id),
            GateError::FactStale { fact_id, .. } => Some(fact_id),
            _ => None,
        }
    }
}

/// Result type for gate operations
pub type GateResult<T> = std::result::Result<T, GateError>;
