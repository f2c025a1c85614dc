//! Provider coverage check

use gate_core::FactRegistry;
use std::collections::BTreeSet;

/// Outcome of comparing a policy's inputs with the registered providers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageReport {
    /// Facts the policy reads, sorted
    pub required: Vec<String>,
    /// Required facts with no registered provider, sorted
    pub missing: Vec<String>,
    /// Registered facts the policy never reads, sorted
    pub unused: Vec<String>,
}

impl CoverageReport {
    /// True when every required fact has a provider
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Compare `required_inputs` against the fact ids `registry` can produce
pub fn check_provider_coverage(
    registry: &FactRegistry,
    required_inputs: &[String],
) -> CoverageReport {
    let registered: BTreeSet<String> = registry.fact_ids().into_iter().collect();
    let required: BTreeSet<String> = required_inputs.iter().cloned().collect();

    CoverageReport {
        missing: required.difference(&registered).cloned().collect(),
        unused: registered.difference(&required).cloned().collect(),
        required: required.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gate_facts::MockFactProvider;
    use std::sync::Arc;

    #[test]
    fn test_complete_coverage() {
        let registry = FactRegistry::new();
        registry.register(Arc::new(MockFactProvider::new("a", 1i64, "a")));
        registry.register(Arc::new(MockFactProvider::new("b", 2i64, "b")));

        let report = check_provider_coverage(&registry, &["a".to_string()]);
        assert!(report.is_complete());
        assert_eq!(report.required, vec!["a"]);
        assert_eq!(report.unused, vec!["b"]);
    }

    #[test]
    fn test_missing_providers_reported_sorted() {
        let registry = FactRegistry::new();
        registry.register(Arc::new(MockFactProvider::new("b", 2i64, "b")));

        let report = check_provider_coverage(
            &registry,
            &["z".to_string(), "b".to_string(), "a".to_string()],
        );
        assert!(!report.is_complete());
        assert_eq!(report.missing, vec!["a", "z"]);
        assert!(report.unused.is_empty());
    }

    #[test]
    fn test_empty_policy_is_covered() {
        let registry = FactRegistry::new();
        assert!(check_provider_coverage(&registry, &[]).is_complete());
    }
}
