//! Gate configuration
//!
//! The configuration surface ([`GateConfig`]), a snapshot cache that only
//! re-reads the backing file when its modification time changes
//! ([`ConfigCache`]), and the [`ConfigSource`] abstraction consumed by
//! configuration-backed fact providers.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod cache;
pub mod config;
pub mod source;

pub use cache::{ConfigCache, ConfigSnapshot};
pub use config::{
    AuditConfig, AuditSinkConfig, FactProvidersConfig, GateConfig, MetricsConfig, PolicyConfig,
    PolicyReload,
};
pub use source::{ConfigSource, FileConfigSource, StaticConfigSource};
