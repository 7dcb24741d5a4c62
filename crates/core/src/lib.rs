//! Concurrent investment-analysis pipeline: fans analysis out per instrument,
//! then normalizes, ranks and allocates whatever came back.

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod provider;
pub mod text;

pub use config::{PipelineConfig, Settings};
pub use domain::{PipelineReport, PipelineState};
pub use engine::{run_pipeline, PipelineOrchestrator};
pub use error::{FailureKind, PipelineError};
pub use provider::AnalysisProviders;
