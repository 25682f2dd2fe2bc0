use crate::core::{MigrateError, Result};
use crate::host::JsonMap;
use crate::version::{VersionCompareFn, VersionId, compare_versions};
use serde_json::Value;
use std::cmp::Ordering;

pub mod step;

pub use step::{AnnounceActionFn, StepOutcome, UpgradeActionFn, VersionStep};

/// Reserved key under which the document's version tag is embedded in the
/// host's persisted-data blob. No other schema is imposed on the blob.
pub const DOCUMENT_VERSION_KEY: &str = "__document_version";

/// Catalog of upgrade steps plus the two version endpoints of a document:
/// the version the document is known to satisfy and the application's current
/// version.
///
/// `document_version` starts out absent, is filled in by the load-side storage
/// hook ([`absorb_loaded_data`](Self::absorb_loaded_data)) and advanced by the
/// engine after each successful step. `app_version` is fixed at construction
/// and bounds pending work from above.
pub struct VersionRegistry {
    steps: Vec<VersionStep>,
    compare: Option<VersionCompareFn>,
    document_version: Option<VersionId>,
    app_version: VersionId,
}

impl VersionRegistry {
    /// Builds a registry over a step catalog.
    ///
    /// Fails with [`MigrateError::ConfigError`] when the application version or
    /// any step's target version is empty. The catalog may be empty and its
    /// insertion order is irrelevant.
    pub fn new(
        app_version: VersionId,
        steps: Vec<VersionStep>,
        compare: Option<VersionCompareFn>,
    ) -> Result<Self> {
        if app_version.is_empty() {
            return Err(MigrateError::ConfigError(
                "current application version must not be empty".to_string(),
            ));
        }
        for step in &steps {
            if step.target_version().is_empty() {
                return Err(MigrateError::ConfigError(
                    "every step must declare a target version".to_string(),
                ));
            }
        }

        Ok(Self {
            steps,
            compare,
            document_version: None,
            app_version,
        })
    }

    /// Orders two version tokens, delegating to the configured override when
    /// one was supplied.
    pub fn compare(&self, a: &VersionId, b: &VersionId) -> Ordering {
        match &self.compare {
            Some(compare) => compare(a, b),
            None => compare_versions(a, b),
        }
    }

    /// Last version the document is known to satisfy, if any has been observed.
    pub fn document_version(&self) -> Option<&VersionId> {
        self.document_version.as_ref()
    }

    /// The application's current version, the upper bound for pending work.
    pub fn app_version(&self) -> &VersionId {
        &self.app_version
    }

    /// Records upgrade progress in memory without persisting anything.
    ///
    /// Called by the engine after each successful step so that subsequent
    /// pending computations see the latest progress even before any save.
    pub fn record_document_version(&mut self, version: VersionId) {
        self.document_version = Some(version);
    }

    /// Whether the document needs an upgrade run at all.
    ///
    /// A document with no recorded version needs a run when any upgrade is
    /// pending or when any catalog step declares an announcement, so first-run
    /// users still see an introduction even with nothing to migrate. Otherwise
    /// the document needs a run iff its version is older than the
    /// application's.
    pub fn needs_upgrade(&self) -> bool {
        match &self.document_version {
            None => !self.pending_upgrades().is_empty() || self.has_whats_new_steps(),
            Some(doc) => self.compare(doc, &self.app_version) == Ordering::Less,
        }
    }

    /// Pending steps derived from the registry's own endpoints.
    pub fn pending_upgrades(&self) -> Vec<VersionStep> {
        self.pending_between(self.document_version.as_ref(), &self.app_version)
    }

    /// Pending steps between explicit endpoints, sorted ascending by target.
    ///
    /// With no saved version every step at or below `current` is pending: a
    /// brand-new document is considered to need every historical step up to
    /// the present. Otherwise a step is pending iff its target lies strictly
    /// after `saved` and at or before `current`. Equal-comparing targets keep
    /// their catalog order.
    pub fn pending_between(
        &self,
        saved: Option<&VersionId>,
        current: &VersionId,
    ) -> Vec<VersionStep> {
        let mut pending: Vec<VersionStep> = self
            .steps
            .iter()
            .filter(|step| {
                let target = step.target_version();
                let within_current = self.compare(target, current) != Ordering::Greater;
                match saved {
                    None => within_current,
                    Some(saved) => {
                        self.compare(saved, target) == Ordering::Less && within_current
                    }
                }
            })
            .cloned()
            .collect();

        pending.sort_by(|a, b| self.compare(a.target_version(), b.target_version()));
        pending
    }

    /// Pending steps that declare an announcement action.
    pub fn pending_whats_new(&self) -> Vec<VersionStep> {
        self.pending_upgrades()
            .into_iter()
            .filter(|step| step.has_whats_new())
            .collect()
    }

    /// Whether any catalog step declares an announcement, pending or not.
    pub fn has_whats_new_steps(&self) -> bool {
        self.steps.iter().any(|step| step.has_whats_new())
    }

    /// The sorted catalog from `version` (inclusive) up to the application
    /// version. Used to re-run a failed step and everything after it.
    pub fn catalog_from(&self, version: &VersionId) -> Vec<VersionStep> {
        let mut tail: Vec<VersionStep> = self
            .steps
            .iter()
            .filter(|step| {
                let target = step.target_version();
                self.compare(target, version) != Ordering::Less
                    && self.compare(target, &self.app_version) != Ordering::Greater
            })
            .cloned()
            .collect();

        tail.sort_by(|a, b| self.compare(a.target_version(), b.target_version()));
        tail
    }

    /// Load-side storage hook: extracts the version tag from a freshly loaded
    /// blob. A blob without a tag marks the document as never upgraded.
    pub fn absorb_loaded_data(&mut self, data: &JsonMap) {
        self.document_version = data
            .get(DOCUMENT_VERSION_KEY)
            .and_then(Value::as_str)
            .map(VersionId::from);
    }

    /// Save-side storage hook: injects the current version tag into an
    /// outgoing blob before the host persists it.
    pub fn stamp_outgoing_data(&self, data: &mut JsonMap) {
        let tag = self
            .document_version
            .clone()
            .unwrap_or_else(|| self.app_version.clone());
        data.insert(
            DOCUMENT_VERSION_KEY.to_string(),
            Value::String(tag.as_str().to_string()),
        );
    }
}

impl std::fmt::Debug for VersionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionRegistry")
            .field("steps", &self.steps.len())
            .field("document_version", &self.document_version)
            .field("app_version", &self.app_version)
            .field("has_custom_compare", &self.compare.is_some())
            .finish()
    }
}
