pub mod dedup;
pub mod planner;
pub mod relevance;

pub use dedup::{CandidateSet, MergeStats};
pub use planner::{candidate_from_place, PlanOutcome, QueryPlanner, QueryReport};
pub use relevance::RelevancePolicy;
