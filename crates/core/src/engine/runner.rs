use crate::domain::{AnalysisResult, AnalysisStatus, Component, ComponentError, Instrument};
use crate::engine::retry::{Attempted, RetryPolicy};
use crate::provider::AnalysisProviders;
use std::time::Duration;

/// Runs the three analysis capabilities for one instrument. Holds no mutable
/// state, so one runner is shared by every task of a fan-out.
#[derive(Debug, Clone)]
pub struct AnalysisTaskRunner {
    providers: AnalysisProviders,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl AnalysisTaskRunner {
    pub fn new(providers: AnalysisProviders, retry: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            providers,
            retry,
            call_timeout,
        }
    }

    pub async fn analyze(&self, instrument: &Instrument) -> AnalysisResult {
        let market = self.retry.run("market_research", self.call_timeout, || {
            self.providers.market.market_research(instrument)
        });
        let financial = self.retry.run("financial_review", self.call_timeout, || {
            self.providers.financial.financial_review(instrument)
        });
        let risk = self.retry.run("risk_assessment", self.call_timeout, || {
            self.providers.risk.risk_assessment(instrument)
        });

        let (market, financial, risk) = tokio::join!(market, financial, risk);

        let mut errors = Vec::new();
        let market = settle(Component::MarketResearch, market, &mut errors);
        let financial = settle(Component::FinancialReview, financial, &mut errors);
        let risk = settle(Component::RiskAssessment, risk, &mut errors);

        let result = AnalysisResult::assemble(instrument.clone(), market, financial, risk, errors);

        match result.status {
            AnalysisStatus::Complete => {
                tracing::debug!(instrument = %instrument, "analysis complete");
            }
            AnalysisStatus::Partial => {
                tracing::warn!(
                    instrument = %instrument,
                    missing = ?result.missing_components(),
                    "analysis partial"
                );
            }
            AnalysisStatus::Failed { kind } => {
                tracing::warn!(instrument = %instrument, %kind, "analysis failed for every component");
            }
        }

        result
    }
}

fn settle<T>(component: Component, attempted: Attempted<T>, errors: &mut Vec<ComponentError>) -> Option<T> {
    match attempted.result {
        Ok(value) => Some(value),
        Err(err) => {
            errors.push(ComponentError {
                component,
                kind: err.kind,
                message: err.message,
                attempts: attempted.attempts,
            });
            None
        }
    }
}
