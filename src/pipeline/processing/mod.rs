// Pipeline processing: extraction, tidying, period filtering, joins and scoring

pub mod enrich;
pub mod normalize;
pub mod parser;
pub mod period;
pub mod score;

pub use enrich::{ReferenceJoiner, RuleMatch};
pub use normalize::{ColumnNormalizer, PolicyRegistry, TidyPolicy};
pub use parser::{Extraction, RecordExtractor};
pub use period::PeriodFilter;
pub use score::{ScoreAggregator, ScoreCard, ScoreGroup};
