//! Gate decisions

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of one policy evaluation
///
/// A decision only exists when evaluation ran to completion. There is no
/// default decision: every failure path surfaces an error instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the deployment may proceed
    pub allow: bool,

    /// Human-readable reasons, as reported by the policy
    pub deny_reasons: Vec<String>,

    /// Identifier of the policy bundle that produced the decision
    pub policy_sha: String,

    /// Content hash of the configuration in effect
    pub config_sha: String,

    /// Wall time spent inside the evaluator
    #[serde(rename = "eval_duration_ms", with = "duration_ms")]
    pub eval_duration: Duration,
}

impl Decision {
    /// A decision exactly as the evaluator reported it
    pub fn new(allow: bool, policy_sha: impl Into<String>, deny_reasons: Vec<String>) -> Self {
        Self {
            allow,
            deny_reasons,
            policy_sha: policy_sha.into(),
            config_sha: String::new(),
            eval_duration: Duration::ZERO,
        }
    }

    /// An allowing decision
    pub fn allowed(policy_sha: impl Into<String>) -> Self {
        Self::new(true, policy_sha, Vec::new())
    }

    /// A denying decision with reasons
    pub fn denied(policy_sha: impl Into<String>, deny_reasons: Vec<String>) -> Self {
        Self::new(false, policy_sha, deny_reasons)
    }

    pub fn with_config_sha(mut self, config_sha: impl Into<String>) -> Self {
        self.config_sha = config_sha.into();
        self
    }

    pub fn with_eval_duration(mut self, eval_duration: Duration) -> Self {
        self.eval_duration = eval_duration;
        self
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
