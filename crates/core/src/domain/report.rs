use crate::domain::analysis::{AnalysisStatus, Component, ComponentError};
use crate::domain::instrument::Instrument;
use crate::error::FailureKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const EDUCATIONAL_REMINDER: &str = "Educational purposes only. Not financial advice.";

/// Per-dimension scores on the common [0, 100] scale. `None` when the
/// underlying component was not available.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SubScores {
    pub growth: Option<f64>,
    pub risk: Option<f64>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedScore {
    pub instrument: Instrument,
    /// Composite score in [0, 100].
    pub score: f64,
    pub sub_scores: SubScores,
    /// Provider confidence in [0, 1].
    pub confidence: f64,
    pub low_confidence: bool,
    pub status: AnalysisStatus,
    #[serde(default)]
    pub company_name: Option<String>,
    pub rationale: Vec<String>,
    #[serde(default)]
    pub risk_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub rank: usize,
    pub instrument: Instrument,
    pub score: NormalizedScore,
    /// Placed below its raw-score position by the confidence floor.
    pub demoted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub instrument: Instrument,
    pub rank: usize,
    pub weight: f64,
    pub capped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapWaiverReason {
    /// Only one instrument could be allocated; it takes the whole book.
    SingleSurvivor,
    /// Fewer instruments survived than the cap needs to reach a full book.
    TooFewSurvivors,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapWaiver {
    pub effective_cap: f64,
    pub reason: CapWaiverReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub allocations: Vec<Allocation>,
    pub per_instrument_cap: f64,
    #[serde(default)]
    pub cap_waiver: Option<CapWaiver>,
    #[serde(default)]
    pub empty_reason: Option<FailureKind>,
}

impl AllocationPlan {
    pub fn empty(per_instrument_cap: f64, reason: FailureKind) -> Self {
        Self {
            allocations: Vec::new(),
            per_instrument_cap,
            cap_waiver: None,
            empty_reason: Some(reason),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.allocations.iter().map(|a| a.weight).sum()
    }

    pub fn weight_of(&self, instrument: &Instrument) -> Option<f64> {
        self.allocations
            .iter()
            .find(|a| &a.instrument == instrument)
            .map(|a| a.weight)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "kebab-case")]
pub enum PipelineState {
    Pending,
    Analyzing,
    Normalizing,
    Ranking,
    Allocating,
    Done,
    Aborted(AbortReason),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Aborted(_))
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Pending => f.write_str("pending"),
            PipelineState::Analyzing => f.write_str("analyzing"),
            PipelineState::Normalizing => f.write_str("normalizing"),
            PipelineState::Ranking => f.write_str("ranking"),
            PipelineState::Allocating => f.write_str("allocating"),
            PipelineState::Done => f.write_str("done"),
            PipelineState::Aborted(reason) => write!(f, "aborted({reason})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AbortReason {
    ConfigInvalid,
    GlobalTimeout,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::ConfigInvalid => f.write_str("config-invalid"),
            AbortReason::GlobalTimeout => f.write_str("global-timeout"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub instrument: Instrument,
    /// `instrument-failed` when every sub-call failed, `provider-timeout` when
    /// the global deadline cut the analysis short.
    pub kind: FailureKind,
    /// The kind recorded on the analysis result itself.
    pub cause: FailureKind,
    #[serde(default)]
    pub detail: Option<String>,
    pub errors: Vec<ComponentError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialEntry {
    pub instrument: Instrument,
    pub missing: Vec<Component>,
    pub errors: Vec<ComponentError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub generated_at: DateTime<Utc>,
    pub headline: String,
    pub reminder: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: uuid::Uuid,
    pub generated_at: DateTime<Utc>,
    pub instruments: Vec<Instrument>,
    pub state: PipelineState,
    pub overall_failure: bool,
    #[serde(default)]
    pub overall_failure_reason: Option<FailureKind>,
    pub timed_out: bool,
    pub ranked: Vec<RankedEntry>,
    pub allocation: AllocationPlan,
    pub failures: Vec<FailureEntry>,
    pub partials: Vec<PartialEntry>,
    pub summary: PipelineSummary,
}

impl PipelineReport {
    pub fn successes(&self) -> usize {
        self.ranked.len()
    }

    pub fn failure_for(&self, instrument: &Instrument) -> Option<&FailureEntry> {
        self.failures.iter().find(|f| &f.instrument == instrument)
    }

    pub fn entry_for(&self, instrument: &Instrument) -> Option<&RankedEntry> {
        self.ranked.iter().find(|e| &e.instrument == instrument)
    }
}
