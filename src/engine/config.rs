use crate::core::{MigrateError, Result};
use crate::registry::VersionStep;
use crate::version::{VersionCompareFn, VersionId};
use std::cmp::Ordering;
use std::sync::Arc;

/// Upgrade engine configuration.
///
/// Recognized options: the application's current version (required), the step
/// catalog (required, may be empty), an optional comparator override, and the
/// failure-continuation policy.
#[derive(Clone)]
pub struct EngineConfig {
    /// The application's current version, the upper bound for pending work.
    pub current_version: VersionId,

    /// The upgrade step catalog, in any order.
    pub steps: Vec<VersionStep>,

    /// Optional ordering override, used unconditionally when present.
    pub compare_fn: Option<VersionCompareFn>,

    /// Whether a run keeps going after a step fails.
    ///
    /// Migrations are frequently independent, so integrators may opt into
    /// best-effort completion; the default halts on the first failure.
    pub continue_on_error: bool,
}

impl EngineConfig {
    /// Creates a configuration for an application version.
    pub fn new(current_version: impl Into<VersionId>) -> Self {
        Self {
            current_version: current_version.into(),
            steps: Vec::new(),
            compare_fn: None,
            continue_on_error: false,
        }
    }

    /// Adds one step to the catalog.
    pub fn step(mut self, step: VersionStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Adds multiple steps to the catalog.
    pub fn steps<I>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = VersionStep>,
    {
        self.steps.extend(steps);
        self
    }

    /// Sets a comparator override.
    pub fn compare_with<F>(mut self, compare: F) -> Self
    where
        F: Fn(&VersionId, &VersionId) -> Ordering + Send + Sync + 'static,
    {
        self.compare_fn = Some(Arc::new(compare));
        self
    }

    /// Sets the failure-continuation policy.
    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.current_version.is_empty() {
            return Err(MigrateError::ConfigError(
                "current_version must not be empty".to_string(),
            ));
        }

        for step in &self.steps {
            if step.target_version().is_empty() {
                return Err(MigrateError::ConfigError(
                    "every step must declare a target version".to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("current_version", &self.current_version)
            .field("steps", &self.steps.len())
            .field("has_custom_compare", &self.compare_fn.is_some())
            .field("continue_on_error", &self.continue_on_error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StepOutcome;
    use futures::FutureExt;

    fn noop_step(target: &str) -> VersionStep {
        VersionStep::new(target, |_ctx| async { Ok(StepOutcome::Done) }.boxed())
    }

    #[test]
    fn test_builder_pattern() {
        let config = EngineConfig::new("2.0.0")
            .step(noop_step("1.1.0"))
            .steps(vec![noop_step("1.2.0"), noop_step("2.0.0")])
            .continue_on_error(true);

        assert_eq!(config.current_version.as_str(), "2.0.0");
        assert_eq!(config.steps.len(), 3);
        assert!(config.continue_on_error);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_policy_halts_on_failure() {
        let config = EngineConfig::new("1.0.0");
        assert!(!config.continue_on_error);
    }

    #[test]
    fn test_validate_rejects_empty_current_version() {
        let config = EngineConfig::new("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_step_without_target() {
        let config = EngineConfig::new("1.0.0").step(noop_step(""));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_catalog_is_valid() {
        let config = EngineConfig::new("1.0.0");
        assert!(config.validate().is_ok());
    }
}
