//! Policy language errors

use gate_core::GateError;
use thiserror::Error;

/// Errors raised while compiling or evaluating a policy
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("line {line}: {message}")]
    Lex { line: usize, message: String },

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("{0}")]
    Compile(String),

    #[error("invalid query: {0}")]
    Query(String),

    #[error("{0}")]
    Eval(String),
}

impl PolicyError {
    /// Whether the error happened at evaluation time rather than load time
    pub fn is_eval(&self) -> bool {
        matches!(self, PolicyError::Eval(_))
    }
}

impl From<PolicyError> for GateError {
    fn from(err: PolicyError) -> Self {
        if err.is_eval() {
            GateError::PolicyEvaluation(err.to_string())
        } else {
            GateError::PolicyLoad(err.to_string())
        }
    }
}

pub type PolicyResult<T> = Result<T, PolicyError>;
