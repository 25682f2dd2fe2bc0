use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;

/// The full persisted-data blob of a host document.
pub type JsonMap = serde_json::Map<String, Value>;

/// A generic trait for the host document/editor the engine migrates.
///
/// This trait allows writing migration code that is agnostic to the underlying
/// editor implementation. You can use [`MemoryDocumentHost`] for tests and
/// simple apps, or wrap a real editor document to implement this trait for
/// production use. The engine only ever reaches the host through this surface;
/// persisting the blob durably ("persist now") stays on the host side.
#[async_trait]
pub trait DocumentHost: Send + Sync {
    /// Read the full persisted-data blob.
    async fn persisted_data(&self) -> JsonMap;

    /// Replace the full persisted-data blob.
    async fn set_persisted_data(&self, data: JsonMap);

    /// Read-only structural accessor for the document's components.
    async fn components(&self) -> Value;

    /// Read-only structural accessor for the document's styles.
    async fn styles(&self) -> Value;

    /// Read-only structural accessor for the document's pages.
    async fn pages(&self) -> Value;
}

/// In-memory [`DocumentHost`] backed by plain JSON values.
///
/// Suitable for tests and for applications whose document already lives in
/// memory as JSON.
#[derive(Debug, Default)]
pub struct MemoryDocumentHost {
    data: Mutex<JsonMap>,
    components: Value,
    styles: Value,
    pages: Value,
}

impl MemoryDocumentHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the persisted-data blob.
    pub fn with_data(mut self, data: JsonMap) -> Self {
        self.data = Mutex::new(data);
        self
    }

    /// Seeds the structural accessors.
    pub fn with_structure(mut self, components: Value, styles: Value, pages: Value) -> Self {
        self.components = components;
        self.styles = styles;
        self.pages = pages;
        self
    }
}

#[async_trait]
impl DocumentHost for MemoryDocumentHost {
    async fn persisted_data(&self) -> JsonMap {
        self.data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn set_persisted_data(&self, data: JsonMap) {
        *self
            .data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = data;
    }

    async fn components(&self) -> Value {
        self.components.clone()
    }

    async fn styles(&self) -> Value {
        self.styles.clone()
    }

    async fn pages(&self) -> Value {
        self.pages.clone()
    }
}
