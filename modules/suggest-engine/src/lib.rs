pub mod analysis;
pub mod error;
pub mod follow;
pub mod loader;
pub mod page;
pub mod source;
pub mod visibility;

pub use analysis::{AnalysisRunner, AnalysisState, Phase, RunId, CONNECTION_FAILURE, PARSE_FAILURE};
pub use error::{EngineError, FollowError, Result};
pub use follow::{follow_offered, Credentials, FollowAction, FollowControl, ToggleOutcome};
pub use loader::{CacheStats, ProfileLoader};
pub use page::{FollowState, PageRegistry, PageSession, PageView, RowView};
pub use source::{ProfileSource, SocialGraph, SuggestionSource};
pub use visibility::{RowGeometry, RowWatch, Viewport, VisibilityTracker};
