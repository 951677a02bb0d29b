//! Configuration and dependency wiring.

mod dependencies;
mod settings;

pub use dependencies::App;
pub use settings::{AppConfig, ArchiveType, SearchBackend, DEFAULT_OPENSEARCH_URL};
