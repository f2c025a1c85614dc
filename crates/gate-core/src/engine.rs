//! Policy engine contract

use crate::decision::Decision;
use crate::error::GateResult;
use crate::fact::FactMap;
use crate::policy::PolicyBundle;
use async_trait::async_trait;

/// Evaluates a bundle against a fact snapshot
///
/// Implementations fill `allow`, `deny_reasons`, `policy_sha` and
/// `eval_duration`. The configuration hash is stamped by the caller.
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    async fn evaluate(&self, bundle: &dyn PolicyBundle, facts: &FactMap) -> GateResult<Decision>;
}
