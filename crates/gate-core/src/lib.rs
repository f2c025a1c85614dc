//! Gate core
//!
//! Contracts and orchestration for a deployment gate: a decision point that
//! collects timestamped facts about a deployment stage, evaluates them
//! against a declarative policy, and yields an auditable allow/deny
//! [`Decision`].
//!
//! # Architecture
//!
//! - [`FactProvider`]: produces one fact on demand
//! - [`FactRegistry`]: parallel, all-or-nothing, bounded-time snapshots
//! - [`PolicyProvider`] / [`PolicyBundle`]: compiled, shared policy
//! - [`PolicyEngine`]: evaluates a bundle against a snapshot
//! - [`AuditLogger`]: records every decision and every failure
//! - [`GatePipeline`]: one decision cycle end to end
//!
//! Concrete providers, the policy language and audit sinks live in sibling
//! crates.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod audit;
pub mod decision;
pub mod engine;
pub mod error;
pub mod fact;
pub mod metrics;
pub mod pipeline;
pub mod policy;
pub mod registry;

pub use audit::AuditLogger;
pub use decision::Decision;
pub use engine::PolicyEngine;
pub use error::{ErrorKind, GateError, GateResult};
pub use fact::{Fact, FactMap, FactProvider, FactValue, Schema};
pub use metrics::GateMetrics;
pub use pipeline::{GatePipeline, GateRequest};
pub use policy::{PolicyBundle, PolicyProvider};
pub use registry::{FactRegistry, SnapshotOptions};
