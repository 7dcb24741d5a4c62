pub mod analysis;
pub mod instrument;
pub mod report;

pub use analysis::{
    AnalysisResult, AnalysisStatus, Component, ComponentError, FinancialMetrics, MarketFindings,
    RiskMetrics,
};
pub use instrument::{normalize_instruments, Instrument};
pub use report::{
    AbortReason, Allocation, AllocationPlan, CapWaiver, CapWaiverReason, FailureEntry,
    NormalizedScore, PartialEntry, PipelineReport, PipelineState, PipelineSummary, RankedEntry,
    SubScores, EDUCATIONAL_REMINDER,
};
