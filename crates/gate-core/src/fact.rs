//! Facts and fact providers
//!
//! A [`Fact`] is an immutable, timestamped observation about system state.
//! [`FactProvider`]s produce one fact on demand for a deployment stage.

use crate::error::GateResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fact id to value, as handed to a policy engine
pub type FactMap = BTreeMap<String, FactValue>;

/// Value carried by a fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl FactValue {
    /// Name of the value kind, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            FactValue::Bool(_) => "bool",
            FactValue::Int(_) => "int",
            FactValue::Float(_) => "float",
            FactValue::String(_) => "string",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FactValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FactValue::Int(v) => Some(*v as f64),
            FactValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FactValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FactValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// JSON rendition of this value
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FactValue::Bool(v) => serde_json::Value::Bool(*v),
            FactValue::Int(v) => serde_json::Value::from(*v),
            // Non-finite floats have no JSON form
            FactValue::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FactValue::String(v) => serde_json::Value::String(v.clone()),
        }
    }
}

impl std::fmt::Display for FactValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FactValue::Bool(v) => write!(f, "{}", v),
            FactValue::Int(v) => write!(f, "{}", v),
            FactValue::Float(v) => write!(f, "{}", v),
            FactValue::String(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for FactValue {
    fn from(v: i64) -> Self {
        FactValue::Int(v)
    }
}

impl From<i32> for FactValue {
    fn from(v: i32) -> Self {
        FactValue::Int(v as i64)
    }
}

impl From<f64> for FactValue {
    fn from(v: f64) -> Self {
        FactValue::Float(v)
    }
}

impl From<bool> for FactValue {
    fn from(v: bool) -> Self {
        FactValue::Bool(v)
    }
}

impl From<String> for FactValue {
    fn from(v: String) -> Self {
        FactValue::String(v)
    }
}

impl From<&str> for FactValue {
    fn from(v: &str) -> Self {
        FactValue::String(v.to_string())
    }
}

/// A single timestamped observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Fact identifier, e.g. `pending_delta`
    pub id: String,

    /// Observed value
    pub value: FactValue,

    /// When the value was considered current
    pub timestamp: DateTime<Utc>,
}

impl Fact {
    /// Create a fact with an explicit timestamp
    pub fn new(id: impl Into<String>, value: impl Into<FactValue>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
            timestamp,
        }
    }

    /// Create a fact observed now
    pub fn now(id: impl Into<String>, value: impl Into<FactValue>) -> Self {
        Self::new(id, value, Utc::now())
    }

    /// Age of the fact relative to `now`; future timestamps have zero age
    pub fn age_at(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.timestamp).to_std().unwrap_or_default()
    }
}

/// Static metadata describing a fact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub id: String,
    pub description: String,
}

impl Schema {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

/// Produces one fact on demand
///
/// Collection is cancelled by dropping the returned future; implementations
/// must not hold locks across their I/O awaits.
#[async_trait]
pub trait FactProvider: Send + Sync {
    /// Schema of the fact this provider produces. Pure, no I/O.
    fn describe(&self) -> Schema;

    /// Collect the fact for a deployment stage
    async fn collect(&self, deployment_id: &str, stage: &str) -> GateResult<Fact>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_fact_fields() {
        let now = Utc::now();
        let fact = Fact::new("test_fact", 42, now);

        assert_eq!(fact.id, "test_fact");
        assert_eq!(fact.value, FactValue::Int(42));
        assert_eq!(fact.timestamp, now);
    }

    #[test]
    fn test_fact_age() {
        let now = Utc::now();
        let old = Fact::new("f", 1, now - Duration::minutes(10));
        assert_eq!(old.age_at(now), std::time::Duration::from_secs(600));

        let future = Fact::new("f", 1, now + Duration::minutes(1));
        assert_eq!(future.age_at(now), std::time::Duration::ZERO);
    }

    #[test]
    fn test_value_json_is_untagged() {
        let mut facts = FactMap::new();
        facts.insert("pending_delta".into(), FactValue::Int(100));
        facts.insert("ratio".into(), FactValue::Float(0.5));
        facts.insert("frozen".into(), FactValue::Bool(false));
        facts.insert("region".into(), FactValue::from("us-east-1"));

        let json = serde_json::to_string(&facts).unwrap();
        assert_eq!(
            json,
            r#"{"frozen":false,"pending_delta":100,"ratio":0.5,"region":"us-east-1"}"#
        );

        let back: FactMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, facts);
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(FactValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(FactValue::Float(1.5).as_i64(), None);
        assert_eq!(FactValue::from("x").as_str(), Some("x"));
        assert_eq!(FactValue::Bool(true).kind(), "bool");
    }
}
