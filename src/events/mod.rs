use crate::core::LogEntry;
use crate::version::VersionId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Prefix under which event names are rendered, so log output from this module
/// never collides with the host's own event vocabulary.
pub const EVENT_NAMESPACE: &str = "docmigrate";

/// A lifecycle transition announced by the upgrade engine.
#[derive(Debug, Clone)]
pub enum UpgradeEvent {
    /// An upgrade run started; carries the ordered pending target versions.
    RunStarted { pending_versions: Vec<VersionId> },
    /// A step's upgrade action is about to run.
    StepStarted { target_version: VersionId },
    /// A step settled; carries the transcript entries this step produced.
    StepEnded {
        target_version: VersionId,
        logs: Vec<LogEntry>,
    },
    /// A step's upgrade action failed.
    StepFailed {
        target_version: VersionId,
        message: String,
    },
    /// The run ended; `upgraded_to` is the last successfully applied target.
    RunEnded {
        upgraded_to: Option<VersionId>,
        had_failures: bool,
    },
}

/// Discriminant used for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RunStarted,
    StepStarted,
    StepEnded,
    StepFailed,
    RunEnded,
}

impl UpgradeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::RunStarted { .. } => EventKind::RunStarted,
            Self::StepStarted { .. } => EventKind::StepStarted,
            Self::StepEnded { .. } => EventKind::StepEnded,
            Self::StepFailed { .. } => EventKind::StepFailed,
            Self::RunEnded { .. } => EventKind::RunEnded,
        }
    }

    /// Namespaced display name, e.g. `docmigrate:step-started`.
    pub fn name(&self) -> &'static str {
        match self.kind() {
            EventKind::RunStarted => "docmigrate:run-started",
            EventKind::StepStarted => "docmigrate:step-started",
            EventKind::StepEnded => "docmigrate:step-ended",
            EventKind::StepFailed => "docmigrate:step-failed",
            EventKind::RunEnded => "docmigrate:run-ended",
        }
    }
}

/// Handle returned by a subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type EventCallback = Arc<dyn Fn(&UpgradeEvent) + Send + Sync>;

struct Subscriber {
    id: u64,
    kind: Option<EventKind>,
    once: bool,
    callback: EventCallback,
}

impl Subscriber {
    fn matches(&self, kind: EventKind) -> bool {
        self.kind.is_none_or(|wanted| wanted == kind)
    }
}

/// Typed publish/subscribe façade for upgrade lifecycle events.
///
/// Each engine owns one notifier; there is no process-wide bus. Delivery is
/// synchronous, in subscriber-registration order, on whatever task calls
/// [`emit`](Self::emit), with no queuing or buffering. Callbacks may subscribe or
/// unsubscribe re-entrantly.
#[derive(Default)]
pub struct LifecycleNotifier {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl LifecycleNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to one event kind.
    pub fn on<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&UpgradeEvent) + Send + Sync + 'static,
    {
        self.register(Some(kind), false, Arc::new(callback))
    }

    /// Subscribes to every event kind.
    pub fn on_any<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&UpgradeEvent) + Send + Sync + 'static,
    {
        self.register(None, false, Arc::new(callback))
    }

    /// Subscribes to one event kind for a single delivery.
    pub fn once<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&UpgradeEvent) + Send + Sync + 'static,
    {
        self.register(Some(kind), true, Arc::new(callback))
    }

    /// Removes a subscription. Returns whether it was still registered.
    pub fn off(&self, subscription: SubscriptionId) -> bool {
        let mut subscribers = self.lock_subscribers();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != subscription.0);
        subscribers.len() != before
    }

    /// Delivers an event to every matching subscriber, in registration order.
    pub fn emit(&self, event: &UpgradeEvent) {
        log::debug!("{}", event.name());
        let fired: Vec<EventCallback> = {
            let mut subscribers = self.lock_subscribers();
            let fired = subscribers
                .iter()
                .filter(|s| s.matches(event.kind()))
                .map(|s| s.callback.clone())
                .collect();
            subscribers.retain(|s| !(s.once && s.matches(event.kind())));
            fired
        };
        for callback in fired {
            callback(event);
        }
    }

    fn register(&self, kind: Option<EventKind>, once: bool, callback: EventCallback) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock_subscribers().push(Subscriber {
            id,
            kind,
            once,
            callback,
        });
        SubscriptionId(id)
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
