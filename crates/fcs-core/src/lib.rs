#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod logging;

// ---- Stable re-exports ----
pub use error::{ContainerError, EngineError};

pub use config::{load_pipeline_config, load_typed_json, PipelineConfig};
pub use logging::{init_logging, LoggingConfig};
