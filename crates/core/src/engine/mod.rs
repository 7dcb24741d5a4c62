pub mod allocate;
pub mod fanout;
pub mod normalize;
pub mod pipeline;
pub mod rank;
pub mod retry;
pub mod runner;

pub use allocate::{AllocationConstraints, Allocator};
pub use fanout::{FanOutCoordinator, FanOutOutcome};
pub use normalize::{ScoreNormalizer, ScoringWeights};
pub use pipeline::{run_pipeline, PipelineOrchestrator};
pub use rank::Ranker;
pub use retry::{Attempted, RetryPolicy};
pub use runner::AnalysisTaskRunner;
