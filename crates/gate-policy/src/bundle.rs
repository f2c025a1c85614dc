//! Content-addressed policy bundles

use crate::compiler::CompiledPolicy;
use crate::error::PolicyResult;
use crate::eval::Query;
use gate_core::{GateError, GateResult, PolicyBundle};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::any::Any;

/// A compiled policy prepared for one query
///
/// The id is the lowercase hex SHA-256 of the source bytes, so identical
/// sources always produce the same id wherever they were loaded from.
#[derive(Debug, Clone)]
pub struct CompiledPolicyBundle {
    id: String,
    policy: CompiledPolicy,
    query: Query,
}

impl CompiledPolicyBundle {
    /// Compile `source` and prepare `query` against it
    ///
    /// Any failure is classified as a policy load error.
    pub fn from_source(source: &[u8], query: &str) -> GateResult<Self> {
        let text = std::str::from_utf8(source)
            .map_err(|e| GateError::PolicyLoad(format!("policy source is not UTF-8: {}", e)))?;
        let policy = CompiledPolicy::compile(text)
            .map_err(|e| GateError::PolicyLoad(format!("compiling policy: {}", e)))?;
        let query = Query::parse(query)
            .map_err(|e| GateError::PolicyLoad(format!("preparing query: {}", e)))?;

        Ok(Self {
            id: policy_sha(source),
            policy,
            query,
        })
    }

    pub fn policy(&self) -> &CompiledPolicy {
        &self.policy
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Facts the policy reads, sorted
    pub fn required_inputs(&self) -> Vec<String> {
        self.policy.required_inputs()
    }

    /// Evaluate the prepared query; `None` is the empty result set
    pub fn evaluate(&self, input: &Map<String, Value>) -> PolicyResult<Option<Value>> {
        self.policy.evaluate(&self.query, input)
    }
}

impl PolicyBundle for CompiledPolicyBundle {
    fn id(&self) -> &str {
        &self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Lowercase hex SHA-256 of policy source bytes
pub fn policy_sha(source: &[u8]) -> String {
    hex::encode(Sha256::digest(source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gate_core::ErrorKind;

    const SOURCE: &str = "package gate\nresponse = {\"allow\": true, \"deny_reasons\": []}\n";

    #[test]
    fn test_id_is_content_hash() {
        let a = CompiledPolicyBundle::from_source(SOURCE.as_bytes(), "data.gate.response").unwrap();
        let b = CompiledPolicyBundle::from_source(SOURCE.as_bytes(), "data.gate.response").unwrap();

        assert_eq!(a.id(), b.id());
        assert_eq!(a.id(), policy_sha(SOURCE.as_bytes()));
        assert_eq!(a.id().len(), 64);
        assert!(a.id().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_different_source_different_id() {
        let a = CompiledPolicyBundle::from_source(SOURCE.as_bytes(), "data.gate.response").unwrap();
        let other = format!("{}# comment\n", SOURCE);
        let b = CompiledPolicyBundle::from_source(other.as_bytes(), "data.gate.response").unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_invalid_source_is_policy_load() {
        let err = CompiledPolicyBundle::from_source(b"package gate\nallow = = true", "data.gate.allow")
            .unwrap_err();
        assert!(err.is(ErrorKind::PolicyLoad));
    }

    #[test]
    fn test_malformed_query_is_policy_load() {
        let err = CompiledPolicyBundle::from_source(SOURCE.as_bytes(), "gate.response").unwrap_err();
        assert!(err.is(ErrorKind::PolicyLoad));
    }

    #[test]
    fn test_non_utf8_is_policy_load() {
        let err = CompiledPolicyBundle::from_source(&[0xff, 0xfe], "data.gate.response").unwrap_err();
        assert!(err.is(ErrorKind::PolicyLoad));
    }

    #[test]
    fn test_downcast_through_trait_object() {
        let bundle = CompiledPolicyBundle::from_source(SOURCE.as_bytes(), "data.gate.response").unwrap();
        let dynamic: &dyn PolicyBundle = &bundle;
        assert!(dynamic.as_any().downcast_ref::<CompiledPolicyBundle>().is_some());
    }
}
