pub mod analyzers;
pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod storage;
pub mod supertypes;

pub use config::AppConfig;
pub use error::{AnalyzerError, AnalyzerErrorKind, PipelineError, Result};
pub use pipeline::{JobReport, Orchestrator};
pub use storage::{InMemoryStore, Store};
