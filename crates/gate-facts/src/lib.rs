//! Gate fact providers
//!
//! - [`ConfigFactProvider`]: facts derived from the configuration in effect
//! - [`LevelServerProvider`]: facts fetched from the level server, cached per
//!   deployment and stage with a fixed TTL
//! - [`MockFactProvider`]: controllable values, timestamps, errors and delays

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config_provider;
pub mod level_server;
pub mod mock;

pub use config_provider::{ConfigFactProvider, ConfigValueFn};
pub use level_server::LevelServerProvider;
pub use mock::MockFactProvider;
