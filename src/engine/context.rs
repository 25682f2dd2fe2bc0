use crate::core::{LogEntry, LogLevel};
use crate::host::{DocumentHost, JsonMap};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};

pub(crate) type LogSink = Arc<Mutex<Vec<LogEntry>>>;

/// Capability object handed to every upgrade and announcement action.
///
/// It exposes exactly: read access to the document's components, styles and
/// pages; read/write access to the full persisted-data blob; and
/// [`add_log`](Self::add_log). No engine or registry internals are reachable
/// from inside an action, which bounds what migration code can observe or
/// mutate.
#[derive(Clone)]
pub struct UpgradeContext {
    host: Arc<dyn DocumentHost>,
    sink: LogSink,
}

impl UpgradeContext {
    pub(crate) fn new(host: Arc<dyn DocumentHost>, sink: LogSink) -> Self {
        Self { host, sink }
    }

    /// The document's components.
    pub async fn components(&self) -> Value {
        self.host.components().await
    }

    /// The document's styles.
    pub async fn styles(&self) -> Value {
        self.host.styles().await
    }

    /// The document's pages.
    pub async fn pages(&self) -> Value {
        self.host.pages().await
    }

    /// The full persisted-data blob.
    pub async fn persisted_data(&self) -> JsonMap {
        self.host.persisted_data().await
    }

    /// Replaces the full persisted-data blob. Nothing is persisted durably
    /// until the host decides to save.
    pub async fn set_persisted_data(&self, data: JsonMap) {
        self.host.set_persisted_data(data).await;
    }

    /// Appends an entry to the run transcript and returns it.
    ///
    /// The entry is visible through the engine's accumulated logs immediately,
    /// even if the calling step later fails. It is also forwarded to the
    /// ambient `log` facade.
    pub fn add_log(&self, level: LogLevel, message: impl Into<String>) -> LogEntry {
        let entry = LogEntry::new(level, message);
        entry.forward_to_facade();
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryDocumentHost;
    use serde_json::json;

    #[tokio::test]
    async fn test_add_log_is_visible_in_the_sink_immediately() {
        let host = Arc::new(MemoryDocumentHost::new());
        let sink: LogSink = Arc::new(Mutex::new(Vec::new()));
        let ctx = UpgradeContext::new(host, sink.clone());

        let entry = ctx.add_log(LogLevel::Warn, "legacy styles found");
        assert_eq!(entry.message, "legacy styles found");

        let sunk = sink.lock().unwrap();
        assert_eq!(sunk.len(), 1);
        assert_eq!(sunk[0].level, LogLevel::Warn);
    }

    #[tokio::test]
    async fn test_context_reads_and_writes_persisted_data() {
        let host = Arc::new(MemoryDocumentHost::new());
        let ctx = UpgradeContext::new(host, Arc::new(Mutex::new(Vec::new())));

        let mut data = ctx.persisted_data().await;
        assert!(data.is_empty());

        data.insert("layout".to_string(), json!("grid"));
        ctx.set_persisted_data(data).await;
        assert_eq!(ctx.persisted_data().await.get("layout"), Some(&json!("grid")));
    }
}
