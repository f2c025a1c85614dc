//! Policy bundle and provider contracts

use crate::error::GateResult;
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

/// A compiled, ready-to-evaluate policy
///
/// Bundles are immutable once built and shared across concurrent
/// evaluations. The identifier is stable for identical policy source.
pub trait PolicyBundle: Send + Sync + 'static {
    /// Content identifier, recorded as `policy_sha` on every decision
    fn id(&self) -> &str;

    /// Concrete type access for engines that only accept their own bundles
    fn as_any(&self) -> &dyn Any;
}

/// Supplies the current policy bundle
#[async_trait]
pub trait PolicyProvider: Send + Sync {
    /// Current bundle; repeated calls may return the same shared instance
    async fn bundle(&self) -> GateResult<Arc<dyn PolicyBundle>>;
}
