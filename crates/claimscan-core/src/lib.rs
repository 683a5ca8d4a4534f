pub mod config;
pub mod document;
pub mod error;
pub mod ingest;
pub mod registry;

pub use config::{
    ExtractionConfig, MatchConfig, PdfConfig, PipelineConfig, QueueConfig, RemoteConfig,
    ValidationConfig,
};
pub use document::{DocumentRecord, DocumentStatus};
pub use error::{Error, Result};
pub use registry::{load_registry, parse_registry, validate_registry, RegistryEntry};
