//! Recommended API entrypoints for host integrations.
//!
//! Pulls in everything a typical integration touches: the engine, its
//! configuration, step declarations, the host seam, and the event surface.

pub use crate::core::{LogEntry, LogLevel, MigrateError, Result};
pub use crate::engine::{EngineConfig, RunOutcome, RunReport, UpgradeContext, UpgradeEngine};
pub use crate::events::{EventKind, UpgradeEvent};
pub use crate::host::{DocumentHost, JsonMap, MemoryDocumentHost};
pub use crate::registry::{StepOutcome, VersionStep};
pub use crate::version::VersionId;
