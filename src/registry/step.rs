use crate::core::{LogEntry, Result};
use crate::engine::UpgradeContext;
use crate::version::VersionId;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Normalized result of an upgrade action.
///
/// Migration code may report nothing, a single summary message, or a batch of
/// transcript entries. The engine inspects the value once at the step boundary
/// and derives the transcript from it.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// The step completed; the engine synthesizes a generic completion entry.
    Done,
    /// The step completed with a summary used as its info-level entry.
    Message(String),
    /// The step completed and produced its own transcript entries.
    Logs(Vec<LogEntry>),
}

/// A migration action. Receives a capability context and settles asynchronously.
pub type UpgradeActionFn =
    Arc<dyn Fn(UpgradeContext) -> BoxFuture<'static, Result<StepOutcome>> + Send + Sync>;

/// A post-upgrade announcement action, independent of upgrade success.
pub type AnnounceActionFn =
    Arc<dyn Fn(UpgradeContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// One migration unit, keyed by the version it upgrades a document *to*.
///
/// Steps are immutable declarations supplied at engine construction. The order
/// of the catalog as supplied is irrelevant; pending lists are re-sorted by
/// version before execution.
#[derive(Clone)]
pub struct VersionStep {
    target_version: VersionId,
    upgrade: UpgradeActionFn,
    whats_new: Option<AnnounceActionFn>,
}

impl std::fmt::Debug for VersionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionStep")
            .field("target_version", &self.target_version)
            .field("has_whats_new", &self.whats_new.is_some())
            .finish()
    }
}

impl VersionStep {
    /// Creates a step upgrading a document to `target_version`.
    ///
    /// The action typically ends in [`FutureExt::boxed`](futures::FutureExt::boxed):
    ///
    /// ```ignore
    /// use futures::FutureExt;
    ///
    /// let step = VersionStep::new("1.2.0", |ctx| {
    ///     async move {
    ///         ctx.add_log(LogLevel::Info, "rewriting page metadata");
    ///         Ok(StepOutcome::Done)
    ///     }
    ///     .boxed()
    /// });
    /// ```
    pub fn new<F>(target_version: impl Into<VersionId>, upgrade: F) -> Self
    where
        F: Fn(UpgradeContext) -> BoxFuture<'static, Result<StepOutcome>> + Send + Sync + 'static,
    {
        Self {
            target_version: target_version.into(),
            upgrade: Arc::new(upgrade),
            whats_new: None,
        }
    }

    /// Attaches a "what's new" announcement action to the step.
    pub fn with_whats_new<F>(mut self, announce: F) -> Self
    where
        F: Fn(UpgradeContext) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        self.whats_new = Some(Arc::new(announce));
        self
    }

    /// The version this step upgrades a document to.
    pub fn target_version(&self) -> &VersionId {
        &self.target_version
    }

    /// Whether the step declares an announcement action.
    pub fn has_whats_new(&self) -> bool {
        self.whats_new.is_some()
    }

    pub(crate) fn invoke_upgrade(&self, ctx: UpgradeContext) -> BoxFuture<'static, Result<StepOutcome>> {
        (self.upgrade)(ctx)
    }

    pub(crate) fn invoke_whats_new(&self, ctx: UpgradeContext) -> Option<BoxFuture<'static, Result<()>>> {
        self.whats_new.as_ref().map(|announce| announce(ctx))
    }
}
