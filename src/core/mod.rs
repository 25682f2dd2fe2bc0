pub mod error;
pub mod log;

pub use error::{MigrateError, Result};
pub use log::{LogEntry, LogLevel};
