//! Rule engine adapter
//!
//! Evaluates a [`CompiledPolicyBundle`] against a fact snapshot and maps
//! the query result `{"allow": bool, "deny_reasons": [string]}` onto a
//! [`Decision`].

use crate::bundle::CompiledPolicyBundle;
use async_trait::async_trait;
use gate_core::{Decision, FactMap, GateError, GateResult, PolicyBundle, PolicyEngine};
use serde_json::{Map, Value};
use std::time::Instant;
use tracing::{debug, warn};

/// Policy engine for bundles compiled from the gate policy language
#[derive(Debug, Clone, Copy, Default)]
pub struct RulePolicyEngine;

impl RulePolicyEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PolicyEngine for RulePolicyEngine {
    async fn evaluate(&self, bundle: &dyn PolicyBundle, facts: &FactMap) -> GateResult<Decision> {
        let compiled = bundle
            .as_any()
            .downcast_ref::<CompiledPolicyBundle>()
            .ok_or_else(|| {
                GateError::PolicyEvaluation(format!(
                    "invalid policy bundle type for bundle {}",
                    bundle.id()
                ))
            })?;

        let input = facts_to_input(facts);
        let start = Instant::now();
        let result = compiled.evaluate(&input);
        let eval_duration = start.elapsed();

        let result = result
            .map_err(|e| GateError::PolicyEvaluation(format!("evaluation failed: {}", e)))?
            .ok_or_else(|| {
                GateError::PolicyEvaluation(format!(
                    "policy result set is empty for query {}",
                    compiled.query()
                ))
            })?;

        let decision = decision_from_result(&result, compiled.id())?.with_eval_duration(eval_duration);

        debug!(
            policy_id = %compiled.id(),
            allow = decision.allow,
            eval_us = eval_duration.as_micros() as u64,
            "Policy evaluated"
        );
        Ok(decision)
    }
}

/// Policy input: one field per fact
pub fn facts_to_input(facts: &FactMap) -> Map<String, Value> {
    facts
        .iter()
        .map(|(id, value)| (id.clone(), value.to_json()))
        .collect()
}

fn decision_from_result(result: &Value, policy_sha: &str) -> GateResult<Decision> {
    let object = result.as_object().ok_or_else(|| {
        GateError::PolicyEvaluation(format!("unexpected result format: {}", result))
    })?;

    let allow = match object.get("allow") {
        Some(Value::Bool(allow)) => *allow,
        Some(other) => {
            return Err(GateError::PolicyEvaluation(format!(
                "`allow` must be a boolean, got {}",
                other
            )))
        }
        None => {
            return Err(GateError::PolicyEvaluation(
                "result has no `allow` field".into(),
            ))
        }
    };

    let reasons = deny_reasons(object.get("deny_reasons"), policy_sha);
    if !allow && reasons.is_empty() {
        warn!(policy_id = %policy_sha, "Policy denied without giving a reason");
    }

    Ok(Decision::new(allow, policy_sha, reasons))
}

/// Reasons as reported, whatever `allow` says
///
/// Non-string entries are kept in their JSON form and a bare string is a
/// single reason. Absent or null means no reasons.
fn deny_reasons(value: Option<&Value>, policy_sha: &str) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(reason)) => vec![reason.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(reason) => reason.clone(),
                other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
            })
            .collect(),
        Some(other) => {
            warn!(policy_id = %policy_sha, deny_reasons = %other, "Ignoring malformed deny_reasons");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gate_core::{ErrorKind, FactValue};
    use serde_json::json;
    use std::any::Any;

    const POLICY: &str = r#"
package gate

default allow = false
allow = true if input.pending_delta <= input.max_pending_allowed

deny "pending_delta exceeds allowed limit" if input.pending_delta > input.max_pending_allowed

response = {"allow": allow, "deny_reasons": deny_reasons}
"#;

    fn bundle(source: &str, query: &str) -> CompiledPolicyBundle {
        CompiledPolicyBundle::from_source(source.as_bytes(), query).unwrap()
    }

    fn facts(pending: i64, max: i64) -> FactMap {
        let mut facts = FactMap::new();
        facts.insert("pending_delta".into(), FactValue::Int(pending));
        facts.insert("max_pending_allowed".into(), FactValue::Int(max));
        facts
    }

    struct ForeignBundle;

    impl PolicyBundle for ForeignBundle {
        fn id(&self) -> &str {
            "foreign"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[tokio::test]
    async fn test_allow() {
        let bundle = bundle(POLICY, "data.gate.response");
        let decision = RulePolicyEngine::new()
            .evaluate(&bundle, &facts(100, 500))
            .await
            .unwrap();

        assert!(decision.allow);
        assert!(decision.deny_reasons.is_empty());
        assert_eq!(decision.policy_sha, bundle.id());
        assert!(decision.config_sha.is_empty());
    }

    #[tokio::test]
    async fn test_deny_with_reason() {
        let bundle = bundle(POLICY, "data.gate.response");
        let decision = RulePolicyEngine::new()
            .evaluate(&bundle, &facts(600, 500))
            .await
            .unwrap();

        assert!(!decision.allow);
        assert_eq!(
            decision.deny_reasons,
            vec!["pending_delta exceeds allowed limit".to_string()]
        );
    }

    #[tokio::test]
    async fn test_foreign_bundle_rejected() {
        let err = RulePolicyEngine::new()
            .evaluate(&ForeignBundle, &FactMap::new())
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::PolicyEvaluation));
    }

    #[tokio::test]
    async fn test_empty_result_set_rejected() {
        let bundle = bundle("package gate\nresponse = {\"allow\": true} if input.ready", "data.gate.response");
        let err = RulePolicyEngine::new()
            .evaluate(&bundle, &FactMap::new())
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::PolicyEvaluation));
        assert!(err.to_string().contains("empty"));
    }

    #[tokio::test]
    async fn test_non_object_result_rejected() {
        let bundle = bundle("package gate\nresponse = true", "data.gate.response");
        let err = RulePolicyEngine::new()
            .evaluate(&bundle, &FactMap::new())
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::PolicyEvaluation));
    }

    #[tokio::test]
    async fn test_non_bool_allow_rejected() {
        let bundle = bundle("package gate\nresponse = {\"allow\": \"yes\"}", "data.gate.response");
        let err = RulePolicyEngine::new()
            .evaluate(&bundle, &FactMap::new())
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::PolicyEvaluation));
    }

    #[tokio::test]
    async fn test_evaluation_error_classified() {
        let bundle = bundle(
            "package gate\nresponse = {\"allow\": input.a / input.b > 1}",
            "data.gate.response",
        );
        let mut facts = FactMap::new();
        facts.insert("a".into(), FactValue::Int(1));
        facts.insert("b".into(), FactValue::Int(0));

        let err = RulePolicyEngine::new().evaluate(&bundle, &facts).await.unwrap_err();
        assert!(err.is(ErrorKind::PolicyEvaluation));
        assert!(err.to_string().contains("division by zero"));
    }

    #[test]
    fn test_allow_keeps_reported_reasons() {
        let decision =
            decision_from_result(&json!({"allow": true, "deny_reasons": ["stale"]}), "sha").unwrap();
        assert!(decision.allow);
        assert_eq!(decision.deny_reasons, vec!["stale".to_string()]);
    }

    #[tokio::test]
    async fn test_allow_with_policy_reasons_passes_them_through() {
        let bundle = bundle(
            "package gate\nresponse = {\"allow\": true, \"deny_reasons\": [\"evaluator said so\"]}",
            "data.gate.response",
        );
        let decision = RulePolicyEngine::new()
            .evaluate(&bundle, &FactMap::new())
            .await
            .unwrap();

        assert!(decision.allow);
        assert_eq!(decision.deny_reasons, vec!["evaluator said so".to_string()]);
    }

    #[test]
    fn test_missing_reasons_default_to_empty() {
        let decision = decision_from_result(&json!({"allow": false}), "sha").unwrap();
        assert!(!decision.allow);
        assert!(decision.deny_reasons.is_empty());
    }

    #[test]
    fn test_non_string_reasons_encoded_as_json() {
        let decision = decision_from_result(
            &json!({"allow": false, "deny_reasons": [1, "plain", {"limit": 500}, [true]]}),
            "sha",
        )
        .unwrap();
        assert!(!decision.allow);
        assert_eq!(
            decision.deny_reasons,
            vec!["1", "plain", r#"{"limit":500}"#, "[true]"]
        );
    }

    #[test]
    fn test_single_string_reason() {
        let decision =
            decision_from_result(&json!({"allow": false, "deny_reasons": "frozen"}), "sha").unwrap();
        assert_eq!(decision.deny_reasons, vec!["frozen".to_string()]);
    }

    #[test]
    fn test_malformed_reasons_default_to_empty() {
        let decision =
            decision_from_result(&json!({"allow": false, "deny_reasons": 7}), "sha").unwrap();
        assert!(!decision.allow);
        assert!(decision.deny_reasons.is_empty());
    }

    #[tokio::test]
    async fn test_fact_valued_reason_yields_decision() {
        let bundle = bundle(
            "package gate\nresponse = {\"allow\": false, \"deny_reasons\": [input.pending_delta]}",
            "data.gate.response",
        );
        let decision = RulePolicyEngine::new()
            .evaluate(&bundle, &facts(600, 500))
            .await
            .unwrap();

        assert!(!decision.allow);
        assert_eq!(decision.deny_reasons, vec!["600".to_string()]);
    }

    #[test]
    fn test_facts_to_input() {
        let input = facts_to_input(&facts(1, 2));
        assert_eq!(Value::Object(input), json!({"pending_delta": 1, "max_pending_allowed": 2}));
    }
}
