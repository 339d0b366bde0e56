// cleanroom - stage and commit build configuration for Firefox-based projects
//
// This is the library crate containing the document model and the deferred
// filesystem queue. The binary crate (main.rs) wires them to real settings.

pub mod config;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::{ConfigurationStore, StagerSettings};
pub use models::{ConfigFileFormat, ConfigurationError, JsonEntity, PathResolver};
pub use services::{FileSystem, FsQueue, QueueError, TokioFileSystem, WarningChannel};
pub use state::{QueueEvent, QueueState};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
