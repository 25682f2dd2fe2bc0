// ============================================================================
// DocMigrate Library
// ============================================================================

pub mod core;
pub mod engine;
pub mod events;
pub mod host;
pub mod prelude;
pub mod registry;
pub mod version;

// Re-export main types for convenience
pub use self::core::{LogEntry, LogLevel, MigrateError, Result};
pub use engine::{EngineConfig, RunOutcome, RunReport, UpgradeContext, UpgradeEngine};
pub use events::{EventKind, LifecycleNotifier, SubscriptionId, UpgradeEvent};
pub use host::{DocumentHost, JsonMap, MemoryDocumentHost};
pub use registry::{
    DOCUMENT_VERSION_KEY, StepOutcome, VersionRegistry, VersionStep,
};
pub use version::{VersionCompareFn, VersionId, compare_versions};

// ============================================================================
// High-level usage
// ============================================================================
//
// A document saved under an older release is brought up to date by declaring
// one `VersionStep` per schema change and letting the engine order and run
// whatever is pending:
//
// ```
// use docmigrate::prelude::*;
// use futures::FutureExt;
// use std::sync::Arc;
//
// # async fn demo() -> docmigrate::Result<()> {
// let config = EngineConfig::new("1.2.0")
//     .step(VersionStep::new("1.1.0", |ctx| {
//         async move {
//             let mut data = ctx.persisted_data().await;
//             data.remove("legacy_theme");
//             ctx.set_persisted_data(data).await;
//             Ok(StepOutcome::Message("Dropped the legacy theme field".into()))
//         }
//         .boxed()
//     }))
//     .step(VersionStep::new("1.2.0", |_ctx| {
//         async move { Ok(StepOutcome::Done) }.boxed()
//     }));
//
// let engine = UpgradeEngine::new(config, Arc::new(MemoryDocumentHost::new()))?;
// engine.document_loaded(&Default::default())?;
// if engine.needs_upgrade()? {
//     let report = engine.run_upgrades().await;
//     assert!(report.is_success());
// }
// # Ok(())
// # }
// ```
