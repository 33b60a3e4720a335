// Common utilities and shared definitions used across the pipeline

pub mod constants;
pub mod error;

pub use error::{Result, ScoringError};
