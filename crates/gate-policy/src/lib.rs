//! Gate policy
//!
//! A small declarative rule language, compiled once at load time into an
//! immutable [`CompiledPolicy`], wrapped in a content-addressed
//! [`CompiledPolicyBundle`] and evaluated by [`RulePolicyEngine`].
//!
//! # Language
//!
//! ```text
//! package gate
//!
//! default allow = false
//! allow = true if input.pending_delta <= input.max_pending_allowed
//!
//! deny "pending_delta exceeds allowed limit" if input.pending_delta > input.max_pending_allowed
//!
//! response = {"allow": allow, "deny_reasons": deny_reasons}
//! ```
//!
//! - `package <name>` must come first
//! - `default <rule> = <expr>` is used when the rule's definition does not hold
//! - `<rule> = <expr> if <cond>` defines a rule, optionally conditionally
//! - `deny "<reason>" if <cond>` contributes to the built-in `deny_reasons`
//! - `input.<fact>` reads a fact; `#` starts a comment
//!
//! Queries take the form `data.<package>.<rule>`.
//!
//! # Usage
//!
//! ```rust
//! use gate_policy::{CompiledPolicy, Query};
//! use serde_json::json;
//!
//! let policy = CompiledPolicy::compile("package gate\nallow = input.n < 3").unwrap();
//! let input = json!({"n": 1}).as_object().cloned().unwrap();
//! let result = policy.evaluate(&Query::parse("data.gate.allow").unwrap(), &input).unwrap();
//! assert_eq!(result, Some(json!(true)));
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod ast;
pub mod bundle;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod eval;
pub mod file;
pub mod lexer;
pub mod parser;

pub use bundle::{policy_sha, CompiledPolicyBundle};
pub use compiler::CompiledPolicy;
pub use engine::{facts_to_input, RulePolicyEngine};
pub use error::{PolicyError, PolicyResult};
pub use eval::Query;
pub use file::FilePolicyProvider;
pub use parser::parse;
