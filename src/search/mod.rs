/// Vector-side ranking: preference adjustment, candidate retrieval and hybrid scoring.

pub mod popularity;
pub mod preference;
pub mod retrieval;

pub use popularity::{HybridHit, HybridScorer};
pub use preference::{AdjustedQuery, PreferenceAdjuster};
pub use retrieval::{rank_by_combined_distance, CandidateRetriever};
