// Re-export modules
pub mod annotate;
pub mod changes;
pub mod config;
pub mod diff;
pub mod error;
pub mod filter;
pub mod history;
pub mod monitor;
pub mod parsers;
pub mod pipeline;
pub mod renderers;
pub mod sink;
pub mod snapshot;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types for convenience
pub use annotate::{Annotation, Annotator};
pub use changes::{Change, ChangeDetails, ChangeKind};
pub use config::MonitorConfig;
pub use error::{Result, WatchError};
pub use monitor::{Monitor, MonitorState, MonitorStatus};
pub use pipeline::Pipeline;
pub use snapshot::Snapshot;
pub use supervisor::Supervisor;
