use crate::config::PipelineConfig;
use crate::domain::{
    normalize_instruments, AbortReason, AllocationPlan, AnalysisResult, AnalysisStatus,
    FailureEntry, Instrument, PartialEntry, PipelineReport, PipelineState, PipelineSummary,
    RankedEntry, EDUCATIONAL_REMINDER,
};
use crate::engine::allocate::Allocator;
use crate::engine::fanout::{FanOutCoordinator, FanOutOutcome};
use crate::engine::normalize::ScoreNormalizer;
use crate::engine::rank::Ranker;
use crate::engine::runner::AnalysisTaskRunner;
use crate::error::{FailureKind, PipelineError};
use crate::provider::AnalysisProviders;
use chrono::{DateTime, Utc};
use tokio::sync::watch;

/// Sequences analysis, normalization, ranking and allocation for one batch of
/// instruments and publishes its state over a `watch` channel.
#[derive(Debug)]
pub struct PipelineOrchestrator {
    providers: AnalysisProviders,
    config: PipelineConfig,
    state: watch::Sender<PipelineState>,
}

impl PipelineOrchestrator {
    pub fn new(providers: AnalysisProviders, config: PipelineConfig) -> Self {
        let (state, _) = watch::channel(PipelineState::Pending);
        Self {
            providers,
            config,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    fn transition(&self, next: PipelineState) {
        let prev = self.state.send_replace(next.clone());
        tracing::info!(from = %prev, to = %next, "pipeline state");
    }

    /// Runs the whole pipeline. Only a configuration problem is returned as
    /// an error; every per-instrument failure ends up in the report.
    pub async fn run<S: AsRef<str>>(&self, symbols: &[S]) -> Result<PipelineReport, PipelineError> {
        self.state.send_replace(PipelineState::Pending);

        let instruments = match self.prepare(symbols) {
            Ok(instruments) => instruments,
            Err(err) => {
                tracing::error!(error = %err, "pipeline rejected before analysis");
                self.transition(PipelineState::Aborted(AbortReason::ConfigInvalid));
                return Err(err);
            }
        };

        let run_id = uuid::Uuid::new_v4();
        tracing::info!(%run_id, instruments = instruments.len(), "pipeline started");

        self.transition(PipelineState::Analyzing);
        let runner = AnalysisTaskRunner::new(
            self.providers.clone(),
            self.config.retry_policy(),
            self.config.call_timeout,
        );
        let outcome = FanOutCoordinator::new(runner)
            .run_all(
                &instruments,
                self.config.effective_concurrency(instruments.len()),
                self.config.global_timeout,
            )
            .await;

        let threshold = self.config.min_success_threshold;
        let successes = outcome.successes();

        let (ranked, allocation, state) =
            if outcome.timed_out && successes == 0 && threshold > 0 {
                let plan = AllocationPlan::empty(
                    self.config.per_instrument_cap,
                    FailureKind::InsufficientSuccesses,
                );
                (
                    Vec::new(),
                    plan,
                    PipelineState::Aborted(AbortReason::GlobalTimeout),
                )
            } else {
                self.transition(PipelineState::Normalizing);
                let scores = ScoreNormalizer::new(self.config.scoring).normalize(&outcome.results);

                self.transition(PipelineState::Ranking);
                let ranked = Ranker::new(self.config.confidence_floor_rank).rank(&scores);

                self.transition(PipelineState::Allocating);
                let plan = Allocator::new(self.config.allocation_constraints()).allocate(&ranked);

                (ranked, plan, PipelineState::Done)
            };

        let overall_failure = ranked.is_empty() || ranked.len() < threshold;
        if overall_failure {
            tracing::warn!(
                successes = ranked.len(),
                threshold,
                "pipeline did not reach the minimum number of successful analyses"
            );
        }

        let generated_at = Utc::now();
        let report = PipelineReport {
            run_id,
            generated_at,
            failures: failure_manifest(&instruments, &outcome),
            partials: partial_manifest(&instruments, &outcome),
            summary: summarize(generated_at, &instruments, &allocation, &ranked),
            instruments,
            state: state.clone(),
            overall_failure,
            overall_failure_reason: overall_failure.then_some(FailureKind::InsufficientSuccesses),
            timed_out: outcome.timed_out,
            ranked,
            allocation,
        };

        self.transition(state);
        tracing::info!(
            %run_id,
            successes = report.successes(),
            failures = report.failures.len(),
            partials = report.partials.len(),
            headline = %report.summary.headline,
            "pipeline finished"
        );

        Ok(report)
    }

    fn prepare<S: AsRef<str>>(&self, symbols: &[S]) -> Result<Vec<Instrument>, PipelineError> {
        let instruments = normalize_instruments(symbols)?;
        self.config.validate(instruments.len())?;
        Ok(instruments)
    }
}

/// Builds an orchestrator for one run.
pub async fn run_pipeline<S: AsRef<str>>(
    symbols: &[S],
    config: &PipelineConfig,
    providers: AnalysisProviders,
) -> Result<PipelineReport, PipelineError> {
    PipelineOrchestrator::new(providers, config.clone())
        .run(symbols)
        .await
}

fn results_in_order<'a>(
    instruments: &'a [Instrument],
    outcome: &'a FanOutOutcome,
) -> impl Iterator<Item = &'a AnalysisResult> + 'a {
    instruments.iter().filter_map(|i| outcome.results.get(i))
}

fn failure_manifest(instruments: &[Instrument], outcome: &FanOutOutcome) -> Vec<FailureEntry> {
    results_in_order(instruments, outcome)
        .filter_map(|r| match r.status {
            AnalysisStatus::Failed { kind: cause } => {
                let kind = if outcome.timed_out && r.errors.is_empty() {
                    FailureKind::ProviderTimeout
                } else {
                    FailureKind::InstrumentFailed
                };
                Some(FailureEntry {
                    instrument: r.instrument.clone(),
                    kind,
                    cause,
                    detail: r.detail.clone(),
                    errors: r.errors.clone(),
                })
            }
            _ => None,
        })
        .collect()
}

fn partial_manifest(instruments: &[Instrument], outcome: &FanOutOutcome) -> Vec<PartialEntry> {
    results_in_order(instruments, outcome)
        .filter(|r| r.status == AnalysisStatus::Partial)
        .map(|r| PartialEntry {
            instrument: r.instrument.clone(),
            missing: r.missing_components(),
            errors: r.errors.clone(),
        })
        .collect()
}

fn summarize(
    generated_at: DateTime<Utc>,
    instruments: &[Instrument],
    allocation: &AllocationPlan,
    ranked: &[RankedEntry],
) -> PipelineSummary {
    let symbols = instruments
        .iter()
        .map(Instrument::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    let headline = match allocation.allocations.first() {
        Some(top) => format!(
            "Completed investment pipeline for {symbols}. {} of {} instruments ranked; top allocation {} at {:.1}%.",
            ranked.len(),
            instruments.len(),
            top.instrument,
            top.weight * 100.0
        ),
        None => format!(
            "Investment pipeline for {symbols} produced no allocation ({}).",
            allocation
                .empty_reason
                .unwrap_or(FailureKind::InsufficientSuccesses)
        ),
    };

    PipelineSummary {
        generated_at,
        headline,
        reminder: EDUCATIONAL_REMINDER.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analysis::fixtures;
    use crate::domain::{CapWaiverReason, Component};
    use crate::error::ProviderErrorKind;
    use crate::provider::scripted::{inst, Profile, ScriptedProvider, Step};
    use std::time::Duration;

    fn config(cap: f64, min_div: usize) -> PipelineConfig {
        PipelineConfig {
            per_instrument_cap: cap,
            min_diversification: min_div,
            ..PipelineConfig::default()
        }
    }

    fn assert_sums_to_one(plan: &AllocationPlan) {
        assert!((plan.total_weight() - 1.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_instrument_is_contained() {
        let (scripted, providers) = ScriptedProvider::new()
            .fail_all("CCC", ProviderErrorKind::ProviderError)
            .into_providers();
        let report = run_pipeline(
            &["AAA", "BBB", "CCC", "DDD", "EEE"],
            &config(0.25, 3),
            providers,
        )
        .await
        .unwrap();

        assert_eq!(report.state, PipelineState::Done);
        assert!(!report.overall_failure);
        assert_eq!(report.ranked.len(), 4);
        assert!(report.entry_for(&inst("CCC")).is_none());

        let failure = report.failure_for(&inst("CCC")).unwrap();
        assert_eq!(failure.kind, FailureKind::InstrumentFailed);
        assert_eq!(failure.cause, FailureKind::ProviderUnavailable);
        assert_eq!(failure.errors.len(), 3);
        assert!(failure.errors.iter().all(|e| e.attempts == 3));
        assert_eq!(scripted.calls("CCC", Component::RiskAssessment), 3);

        assert_eq!(report.allocation.allocations.len(), 4);
        assert!(report.allocation.weight_of(&inst("CCC")).is_none());
        assert_sums_to_one(&report.allocation);
        assert!(report
            .allocation
            .allocations
            .iter()
            .all(|a| a.weight <= 0.25 + 1e-9));
    }

    #[tokio::test(start_paused = true)]
    async fn global_timeout_with_no_successes_aborts() {
        let (_, providers) = ScriptedProvider::new()
            .hang_all("A")
            .hang_all("B")
            .hang_all("C")
            .into_providers();
        let cfg = PipelineConfig {
            global_timeout: Duration::from_secs(10),
            ..config(0.5, 3)
        };
        let report = run_pipeline(&["A", "B", "C"], &cfg, providers).await.unwrap();

        assert!(report.timed_out);
        assert!(report.overall_failure);
        assert_eq!(
            report.overall_failure_reason,
            Some(FailureKind::InsufficientSuccesses)
        );
        assert_eq!(
            report.state,
            PipelineState::Aborted(AbortReason::GlobalTimeout)
        );
        assert!(report.allocation.is_empty());
        assert_eq!(
            report.allocation.empty_reason,
            Some(FailureKind::InsufficientSuccesses)
        );
        assert_eq!(report.failures.len(), 3);
        assert!(report
            .failures
            .iter()
            .all(|f| f.kind == FailureKind::ProviderTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn global_timeout_without_threshold_finishes_done() {
        let (_, providers) = ScriptedProvider::new()
            .hang_all("A")
            .hang_all("B")
            .hang_all("C")
            .into_providers();
        let cfg = PipelineConfig {
            global_timeout: Duration::from_secs(10),
            min_success_threshold: 0,
            ..config(0.5, 3)
        };
        let report = run_pipeline(&["A", "B", "C"], &cfg, providers).await.unwrap();

        assert_eq!(report.state, PipelineState::Done);
        assert!(report.overall_failure);
        assert!(report.allocation.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unmet_threshold_still_reports_allocation() {
        let (_, providers) = ScriptedProvider::new()
            .fail_all("C", ProviderErrorKind::InvalidInstrument)
            .into_providers();
        let cfg = PipelineConfig {
            min_success_threshold: 3,
            ..config(0.5, 3)
        };
        let report = run_pipeline(&["A", "B", "C"], &cfg, providers).await.unwrap();

        assert_eq!(report.state, PipelineState::Done);
        assert!(report.overall_failure);
        assert_eq!(report.ranked.len(), 2);
        assert_sums_to_one(&report.allocation);
        assert_eq!(
            report.failure_for(&inst("C")).unwrap().cause,
            FailureKind::ProviderInvalidInput
        );
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_config_fails_before_any_work() {
        let (scripted, providers) = ScriptedProvider::new().into_providers();
        let orchestrator = PipelineOrchestrator::new(providers, config(1.5, 3));
        let err = orchestrator.run(&["AAA", "BBB"]).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::ConfigInvalid);
        assert_eq!(
            orchestrator.state(),
            PipelineState::Aborted(AbortReason::ConfigInvalid)
        );
        assert_eq!(scripted.calls("AAA", Component::MarketResearch), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_instrument_list_is_rejected() {
        let (_, providers) = ScriptedProvider::new().into_providers();
        let symbols: [&str; 2] = ["  ", ""];
        let err = run_pipeline(&symbols, &PipelineConfig::default(), providers)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ConfigInvalid(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn ranks_and_allocates_with_a_low_confidence_instrument() {
        let strong = Profile {
            financial: fixtures::financial(35.0, 0.9),
            ..Profile::default()
        };
        let (_, providers) = ScriptedProvider::new()
            .with_profile("A", strong)
            .script(
                "C",
                Component::MarketResearch,
                vec![Step::FailAlways(ProviderErrorKind::InvalidInstrument)],
            )
            .script(
                "C",
                Component::FinancialReview,
                vec![Step::FailAlways(ProviderErrorKind::InvalidInstrument)],
            )
            .into_providers();
        let report = run_pipeline(&["a", "B", "c"], &config(0.5, 3), providers)
            .await
            .unwrap();

        assert_eq!(report.state, PipelineState::Done);
        let order: Vec<&str> = report.ranked.iter().map(|e| e.instrument.as_str()).collect();
        assert_eq!(order[0], "A");

        let c = report.entry_for(&inst("C")).unwrap();
        assert!(c.score.low_confidence);
        assert_eq!(c.score.status, AnalysisStatus::Partial);
        assert_ne!(c.rank, 1);

        let partial = &report.partials[0];
        assert_eq!(partial.instrument, inst("C"));
        assert_eq!(
            partial.missing,
            vec![Component::MarketResearch, Component::FinancialReview]
        );

        let plan = &report.allocation;
        assert_sums_to_one(plan);
        assert!(plan.cap_waiver.is_none());
        assert!(plan.allocations.iter().all(|a| a.weight <= 0.5 + 1e-9));
        let weight = |s: &str| plan.weight_of(&inst(s)).unwrap();
        assert!(weight("A") > weight("B"));
        assert!(weight("C") < weight("B"));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_risk_component_discounts_allocation() {
        let strong = Profile {
            financial: fixtures::financial(35.0, 0.9),
            ..Profile::default()
        };
        let (scripted, providers) = ScriptedProvider::new()
            .with_profile("A", strong)
            .script(
                "C",
                Component::RiskAssessment,
                vec![Step::FailAlways(ProviderErrorKind::ProviderError)],
            )
            .into_providers();
        let report = run_pipeline(&["A", "B", "C"], &config(0.5, 3), providers)
            .await
            .unwrap();

        assert_eq!(scripted.calls("C", Component::RiskAssessment), 3);
        assert_eq!(report.partials.len(), 1);
        assert_eq!(report.partials[0].missing, vec![Component::RiskAssessment]);

        let score = |s: &str| report.entry_for(&inst(s)).unwrap().score.clone();
        let (a, b, c) = (score("A"), score("B"), score("C"));
        assert_eq!(c.status, AnalysisStatus::Partial);
        assert!(c.low_confidence);
        assert!(!a.low_confidence && !b.low_confidence);

        let plan = &report.allocation;
        assert_eq!(plan.allocations.len(), 3);
        assert_sums_to_one(plan);
        assert!(plan.allocations.iter().all(|x| x.weight <= 0.5 + 1e-9));
        let weight = |s: &str| plan.weight_of(&inst(s)).unwrap();
        assert!((weight("A") / weight("B") - a.score / b.score).abs() < 1e-9);
        assert!((weight("C") / weight("B") - 0.5 * c.score / b.score).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn default_config_funds_three_instruments_with_waiver() {
        let (_, providers) = ScriptedProvider::new().into_providers();
        let report = run_pipeline(&["AAPL", "MSFT", "NVDA"], &PipelineConfig::default(), providers)
            .await
            .unwrap();

        assert_eq!(report.state, PipelineState::Done);
        assert!(!report.overall_failure);
        let plan = &report.allocation;
        assert_eq!(plan.allocations.len(), 3);
        assert_sums_to_one(plan);
        let waiver = plan.cap_waiver.unwrap();
        assert_eq!(waiver.reason, CapWaiverReason::TooFewSurvivors);
        assert!((waiver.effective_cap - 1.0 / 3.0).abs() < 1e-9);
        assert!(plan
            .allocations
            .iter()
            .all(|x| x.weight <= waiver.effective_cap + 1e-9));
    }

    #[tokio::test(start_paused = true)]
    async fn single_request_takes_whole_book() {
        let (_, providers) = ScriptedProvider::new().into_providers();
        let report = run_pipeline(&["SOLO"], &PipelineConfig::default(), providers)
            .await
            .unwrap();
        assert_eq!(report.allocation.allocations[0].weight, 1.0);
        assert_eq!(
            report.allocation.cap_waiver.map(|w| w.reason),
            Some(CapWaiverReason::SingleSurvivor)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_state_and_summary() {
        let (_, providers) = ScriptedProvider::new().into_providers();
        let orchestrator = PipelineOrchestrator::new(providers, config(0.5, 2));
        let mut rx = orchestrator.subscribe();
        assert_eq!(*rx.borrow(), PipelineState::Pending);

        let report = orchestrator.run(&["MSFT", "AAPL"]).await.unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), PipelineState::Done);
        assert!(report
            .summary
            .headline
            .starts_with("Completed investment pipeline for MSFT, AAPL."));
        assert_eq!(report.summary.reminder, EDUCATIONAL_REMINDER);
        assert_eq!(report.instruments, vec![inst("MSFT"), inst("AAPL")]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["state"], serde_json::json!({"state": "done"}));
    }
}
