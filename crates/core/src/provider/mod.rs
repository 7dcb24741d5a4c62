//! Capabilities the pipeline consumes. Each analysis dimension is its own
//! trait so a deployment can mix implementations per dimension.

pub mod http;
pub mod stub;

#[cfg(test)]
pub(crate) mod scripted;

use crate::domain::{FinancialMetrics, Instrument, MarketFindings, RiskMetrics};
use crate::error::ProviderResult;
use std::sync::Arc;

#[async_trait::async_trait]
pub trait MarketResearch: Send + Sync {
    async fn market_research(&self, instrument: &Instrument) -> ProviderResult<MarketFindings>;
}

#[async_trait::async_trait]
pub trait FinancialReview: Send + Sync {
    async fn financial_review(&self, instrument: &Instrument) -> ProviderResult<FinancialMetrics>;
}

#[async_trait::async_trait]
pub trait RiskAssessment: Send + Sync {
    async fn risk_assessment(&self, instrument: &Instrument) -> ProviderResult<RiskMetrics>;
}

#[derive(Clone)]
pub struct AnalysisProviders {
    pub market: Arc<dyn MarketResearch>,
    pub financial: Arc<dyn FinancialReview>,
    pub risk: Arc<dyn RiskAssessment>,
}

impl AnalysisProviders {
    pub fn new(
        market: Arc<dyn MarketResearch>,
        financial: Arc<dyn FinancialReview>,
        risk: Arc<dyn RiskAssessment>,
    ) -> Self {
        Self {
            market,
            financial,
            risk,
        }
    }

    /// Uses one value for all three capabilities.
    pub fn from_single<P>(provider: Arc<P>) -> Self
    where
        P: MarketResearch + FinancialReview + RiskAssessment + 'static,
    {
        Self {
            market: provider.clone(),
            financial: provider.clone(),
            risk: provider,
        }
    }
}

impl std::fmt::Debug for AnalysisProviders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisProviders").finish_non_exhaustive()
    }
}
