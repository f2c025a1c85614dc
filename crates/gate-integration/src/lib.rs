//! Gate assembly
//!
//! Builds a ready-to-run gate from a [`GateConfig`](gate_config::GateConfig):
//!
//! - `pending_delta` from the level server ([`LevelServerProvider`](gate_facts::LevelServerProvider))
//! - `max_pending_allowed` from the configuration itself
//! - the policy file named by `policy.path`, compiled by [`RulePolicyEngine`](gate_policy::RulePolicyEngine)
//! - the audit sink named by `audit.sink`
//! - Prometheus metrics under `metrics.prefix`
//!
//! The coverage check compares the facts a policy reads with the facts the
//! registry can produce, so a missing provider is reported at startup rather
//! than as an undefined input at decision time.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod assembly;
pub mod coverage;

pub use assembly::{GateAssembly, GateAssemblyBuilder, MAX_PENDING_ALLOWED_FACT, PENDING_DELTA_FACT};
pub use coverage::{check_provider_coverage, CoverageReport};
