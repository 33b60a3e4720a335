pub mod common;
pub mod config;
pub mod domain;
pub mod observability;
pub mod pipeline;

pub use common::{Result, ScoringError};
pub use config::ScoringConfig;
pub use pipeline::{BatchReport, BatchRunner, DocumentOutcome, ReferenceData, ResearcherPipeline};
