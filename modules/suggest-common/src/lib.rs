pub mod config;
pub mod error;
pub mod handle;
pub mod ranking;
pub mod types;

pub use config::Config;
pub use error::SuggestError;
pub use handle::{normalize_handle, Handle};
pub use ranking::{rank, score, wilson_lower_bound, RankedSuggestion, SortMode};
pub use types::*;
