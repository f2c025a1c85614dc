//! Gate audit sinks
//!
//! Implementations of [`gate_core::AuditLogger`]:
//!
//! - [`TracingAuditLogger`]: structured `tracing` events under `gate::audit`
//! - [`MemoryAuditLogger`]: keeps records in memory for tests
//! - [`JsonFileAuditLogger`]: append-only JSON lines file
//!
//! Every sink records the same [`AuditRecord`] shape.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod file;
pub mod memory;
pub mod record;
pub mod tracing_logger;

pub use file::JsonFileAuditLogger;
pub use memory::MemoryAuditLogger;
pub use record::{AuditRecord, DecisionRecord, SystemErrorRecord};
pub use tracing_logger::{TracingAuditLogger, AUDIT_TARGET};
