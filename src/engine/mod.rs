use crate::core::{LogEntry, MigrateError, Result};
use crate::events::{LifecycleNotifier, UpgradeEvent};
use crate::host::{DocumentHost, JsonMap};
use crate::registry::{StepOutcome, VersionRegistry, VersionStep};
use crate::version::VersionId;
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

pub mod config;
pub mod context;

pub use config::EngineConfig;
pub use context::UpgradeContext;

use context::LogSink;

/// Overall outcome of one upgrade run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing was pending; no step executed.
    UpToDate,
    /// Every pending step applied.
    Completed,
    /// At least one step failed; the rest of the run followed the
    /// continuation policy.
    PartiallyFailed,
    /// A run was requested while another was in flight; nothing changed.
    AlreadyRunning,
    /// An error escaped the per-step handling. The run state was still
    /// finalized and the engine remains usable.
    Faulted,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::UpToDate | Self::Completed)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::UpToDate => "nothing to upgrade",
            Self::Completed => "completed",
            Self::PartiallyFailed => "completed with failures",
            Self::AlreadyRunning => "an upgrade run is already in progress",
            Self::Faulted => "aborted by an internal error",
        };
        write!(f, "{label}")
    }
}

/// Result of one upgrade run: outcome, full transcript, the highest version
/// successfully reached, and the targets of failed steps in failure order.
///
/// Every run produces a full transcript regardless of outcome; partial
/// progress is itself useful information for the caller to render.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub logs: Vec<LogEntry>,
    pub upgraded_to: Option<VersionId>,
    pub failed_versions: Vec<VersionId>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    fn bare(outcome: RunOutcome) -> Self {
        Self {
            outcome,
            logs: Vec::new(),
            upgraded_to: None,
            failed_versions: Vec::new(),
        }
    }
}

/// The version-aware sequential upgrade engine.
///
/// Consumes the registry's pending list and executes steps strictly one after
/// another: each step's action fully settles before the next one starts, since
/// later steps may assume the document-state effects of earlier ones. Per-step
/// failures are converted into transcript entries and handled according to the
/// continuation policy; they never cross the step loop.
///
/// All methods take `&self`; share the engine through an [`Arc`]. A second
/// [`run_upgrades`](Self::run_upgrades) while one is in flight is rejected
/// immediately, not queued, to rule out double-application of steps.
pub struct UpgradeEngine {
    registry: Mutex<VersionRegistry>,
    notifier: LifecycleNotifier,
    host: Arc<dyn DocumentHost>,
    continue_on_error: bool,
    running: AtomicBool,
    current_step: Mutex<Option<VersionStep>>,
    logs: LogSink,
    failed: Mutex<Vec<VersionId>>,
}

impl UpgradeEngine {
    /// Builds an engine from a validated configuration and a host document.
    pub fn new(config: EngineConfig, host: Arc<dyn DocumentHost>) -> Result<Self> {
        config.validate()?;
        let registry =
            VersionRegistry::new(config.current_version, config.steps, config.compare_fn)?;

        Ok(Self {
            registry: Mutex::new(registry),
            notifier: LifecycleNotifier::new(),
            host,
            continue_on_error: config.continue_on_error,
            running: AtomicBool::new(false),
            current_step: Mutex::new(None),
            logs: Arc::new(Mutex::new(Vec::new())),
            failed: Mutex::new(Vec::new()),
        })
    }

    /// The engine's lifecycle notifier, for subscribing to run events.
    pub fn notifier(&self) -> &LifecycleNotifier {
        &self.notifier
    }

    /// Whether a run is currently in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The step whose upgrade action is currently in flight, if any.
    pub fn current_step(&self) -> Option<VersionStep> {
        self.current_step
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Defensive copy of the accumulated run transcript.
    pub fn all_logs(&self) -> Vec<LogEntry> {
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Defensive copy of the failed step targets, in failure order.
    pub fn failed_steps(&self) -> Vec<VersionId> {
        self.failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Load-side storage hook: extracts the version tag from freshly loaded
    /// persisted data.
    pub fn document_loaded(&self, data: &JsonMap) -> Result<()> {
        self.registry.lock()?.absorb_loaded_data(data);
        Ok(())
    }

    /// Save-side storage hook: injects the current version tag into an
    /// outgoing blob before the host persists it.
    pub fn stamp_persisted_data(&self, data: &mut JsonMap) -> Result<()> {
        self.registry.lock()?.stamp_outgoing_data(data);
        Ok(())
    }

    /// Whether the document needs an upgrade run at all.
    pub fn needs_upgrade(&self) -> Result<bool> {
        Ok(self.registry.lock()?.needs_upgrade())
    }

    /// Last version the document is known to satisfy.
    pub fn document_version(&self) -> Result<Option<VersionId>> {
        Ok(self.registry.lock()?.document_version().cloned())
    }

    /// Runs every pending upgrade step in ascending version order.
    ///
    /// Rejected immediately with [`RunOutcome::AlreadyRunning`] when a run is
    /// in flight, leaving the in-flight run's state untouched. With nothing
    /// pending, returns [`RunOutcome::UpToDate`] without emitting events or
    /// touching run state. Otherwise the transcript and failed-step list are
    /// reset and the pending steps execute in order; the running flag and
    /// current step are cleared on every exit path.
    pub async fn run_upgrades(&self) -> RunReport {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return RunReport::bare(RunOutcome::AlreadyRunning);
        }

        let report = self.run_pending().await;
        self.finalize();
        report
    }

    /// Re-runs the most recent failed step and every catalog step after it.
    ///
    /// With no recorded failure this is exactly a fresh
    /// [`run_upgrades`](Self::run_upgrades). Already-applied steps before the
    /// failed one are not replayed; steps after it are re-run without checking
    /// whether they are still pending, matching the historical behavior of
    /// the retry flow.
    pub async fn retry_from_failed_step(&self) -> RunReport {
        let last_failed = self
            .failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned();
        let Some(version) = last_failed else {
            return self.run_upgrades().await;
        };

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return RunReport::bare(RunOutcome::AlreadyRunning);
        }

        let tail = match self.registry.lock() {
            Ok(registry) => registry.catalog_from(&version),
            Err(poisoned) => {
                let report = self.faulted_report(poisoned.into());
                self.finalize();
                return report;
            }
        };

        let report = if tail.is_empty() {
            self.run_pending().await
        } else {
            self.execute_sequence(tail).await
        };
        self.finalize();
        report
    }

    /// Runs the announcement action of every pending step that declares one.
    ///
    /// Announcements are informational: a failing or panicking announcement is
    /// recovered as a warning entry and never prevents the remaining
    /// announcements from running.
    pub async fn run_whats_new(&self) -> Result<()> {
        let announcing = self.registry.lock()?.pending_whats_new();
        for step in announcing {
            let ctx = UpgradeContext::new(self.host.clone(), self.logs.clone());
            let Some(future) = step.invoke_whats_new(ctx) else {
                continue;
            };
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    self.append_announcement_warning(step.target_version(), &err.to_string())?;
                }
                Err(payload) => {
                    self.append_announcement_warning(
                        step.target_version(),
                        &panic_message(payload.as_ref()),
                    )?;
                }
            }
        }
        Ok(())
    }

    async fn run_pending(&self) -> RunReport {
        let (pending, effective_version) = match self.registry.lock() {
            Ok(registry) => (
                registry.pending_upgrades(),
                registry
                    .document_version()
                    .cloned()
                    .unwrap_or_else(|| registry.app_version().clone()),
            ),
            Err(poisoned) => return self.faulted_report(poisoned.into()),
        };

        if pending.is_empty() {
            return RunReport {
                outcome: RunOutcome::UpToDate,
                logs: Vec::new(),
                upgraded_to: Some(effective_version),
                failed_versions: Vec::new(),
            };
        }

        self.execute_sequence(pending).await
    }

    async fn execute_sequence(&self, steps: Vec<VersionStep>) -> RunReport {
        match AssertUnwindSafe(self.execute_inner(steps)).catch_unwind().await {
            Ok(Ok(report)) => report,
            Ok(Err(err)) => self.faulted_report(err),
            Err(payload) => {
                self.faulted_report(MigrateError::ExecutionError(panic_message(payload.as_ref())))
            }
        }
    }

    async fn execute_inner(&self, steps: Vec<VersionStep>) -> Result<RunReport> {
        self.logs.lock()?.clear();
        self.failed.lock()?.clear();
        let mut last_successful = self.registry.lock()?.document_version().cloned();
        let mut had_failures = false;

        let pending_versions: Vec<VersionId> =
            steps.iter().map(|s| s.target_version().clone()).collect();
        self.notifier.emit(&UpgradeEvent::RunStarted { pending_versions });

        for step in &steps {
            let target = step.target_version().clone();
            *self.current_step.lock()? = Some(step.clone());
            self.notifier.emit(&UpgradeEvent::StepStarted {
                target_version: target.clone(),
            });

            let logs_before = self.logs.lock()?.len();
            let ctx = UpgradeContext::new(self.host.clone(), self.logs.clone());
            let settled = AssertUnwindSafe(step.invoke_upgrade(ctx)).catch_unwind().await;
            *self.current_step.lock()? = None;

            let result = match settled {
                Ok(result) => result,
                Err(payload) => Err(MigrateError::ExecutionError(panic_message(payload.as_ref()))),
            };

            match result {
                Ok(outcome) => {
                    self.append_success_logs(&target, outcome)?;
                    self.registry.lock()?.record_document_version(target.clone());
                    last_successful = Some(target.clone());

                    let step_logs = self.logs.lock()?.as_slice()[logs_before..].to_vec();
                    self.notifier.emit(&UpgradeEvent::StepEnded {
                        target_version: target,
                        logs: step_logs,
                    });
                }
                Err(err) => {
                    had_failures = true;
                    let message = err.to_string();
                    let entry =
                        LogEntry::error(format!("Upgrade to {target} failed: {message}"));
                    entry.forward_to_facade();
                    self.logs.lock()?.push(entry.clone());
                    self.failed.lock()?.push(target.clone());

                    self.notifier.emit(&UpgradeEvent::StepFailed {
                        target_version: target.clone(),
                        message,
                    });
                    self.notifier.emit(&UpgradeEvent::StepEnded {
                        target_version: target,
                        logs: vec![entry],
                    });

                    if !self.continue_on_error {
                        break;
                    }
                }
            }
        }

        self.notifier.emit(&UpgradeEvent::RunEnded {
            upgraded_to: last_successful.clone(),
            had_failures,
        });

        let outcome = if had_failures {
            RunOutcome::PartiallyFailed
        } else {
            RunOutcome::Completed
        };
        Ok(RunReport {
            outcome,
            logs: self.logs.lock()?.clone(),
            upgraded_to: last_successful,
            failed_versions: self.failed.lock()?.clone(),
        })
    }

    /// Derives the success transcript for one settled step: the action's own
    /// entries first, then exactly one info entry (the action's summary
    /// message when it supplied one, a generic completion line otherwise).
    fn append_success_logs(&self, target: &VersionId, outcome: StepOutcome) -> Result<()> {
        let derived = match outcome {
            StepOutcome::Done => LogEntry::info(format!("Upgraded document to {target}")),
            StepOutcome::Message(message) => LogEntry::info(message),
            StepOutcome::Logs(entries) => {
                for entry in &entries {
                    entry.forward_to_facade();
                }
                self.logs.lock()?.extend(entries);
                LogEntry::info(format!("Upgraded document to {target}"))
            }
        };
        derived.forward_to_facade();
        self.logs.lock()?.push(derived);
        Ok(())
    }

    fn append_announcement_warning(&self, target: &VersionId, message: &str) -> Result<()> {
        let entry =
            LogEntry::warn(format!("What's new announcement for {target} failed: {message}"));
        entry.forward_to_facade();
        self.logs.lock()?.push(entry);
        Ok(())
    }

    /// Builds the distinct failure result for an error that escaped the
    /// per-step handling, preserving whatever transcript and progress had
    /// accumulated.
    fn faulted_report(&self, err: MigrateError) -> RunReport {
        let entry = LogEntry::error(format!("Upgrade run aborted: {err}"));
        entry.forward_to_facade();

        let logs = {
            let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
            logs.push(entry);
            logs.clone()
        };
        let failed = self
            .failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let upgraded_to = match self.registry.lock() {
            Ok(registry) => registry.document_version().cloned(),
            Err(poisoned) => poisoned.into_inner().document_version().cloned(),
        };

        RunReport {
            outcome: RunOutcome::Faulted,
            logs,
            upgraded_to,
            failed_versions: failed,
        }
    }

    /// Clears the running flag and current step. Executed on every exit path
    /// of a run, including catastrophic ones, so the engine stays usable.
    fn finalize(&self) {
        *self
            .current_step
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.running.store(false, Ordering::SeqCst);
    }
}

impl fmt::Debug for UpgradeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeEngine")
            .field("is_running", &self.is_running())
            .field("continue_on_error", &self.continue_on_error)
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown error".to_string()
    }
}
