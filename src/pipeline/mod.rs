// Scoring pipeline: ingestion, per-section processing, references, batch orchestration and output

pub mod ingestion;
pub mod orchestrator;
pub mod output;
pub mod processing;
pub mod reference;
pub mod researcher;

pub use orchestrator::{BatchReport, BatchRunner};
pub use reference::ReferenceData;
pub use researcher::{DocumentOutcome, ResearcherPipeline, ResearcherReport};
