//! Historical pattern access.
//!
//! Answers "what happened historically at this time of day, on this weekday,
//! and after runs starting here" for one instrument, and folds the answers
//! into a single directional vote for fusion.

pub mod accessor;
pub mod cache;
pub mod vote;

pub use accessor::{HistoricalPatternAccessor, SEQUENCE_LENGTH};
pub use cache::{CacheKey, PatternCache};
pub use vote::{combine, HistoricalStatus, HistoricalVote};
