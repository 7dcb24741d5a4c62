use crate::domain::{FinancialMetrics, Instrument, MarketFindings, RiskMetrics};
use crate::error::ProviderResult;
use crate::provider::{FinancialReview, MarketResearch, RiskAssessment};

/// Deterministic placeholder analysis derived from the symbol text. Used for
/// dry runs and demos; replace with a real provider for anything else.
#[derive(Debug, Clone, Default)]
pub struct StubAnalysisProvider;

impl StubAnalysisProvider {
    pub fn new() -> Self {
        Self
    }
}

// FNV-1a keeps the placeholder stable across platforms and releases.
fn seed(instrument: &Instrument) -> u64 {
    instrument
        .as_str()
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
            (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
        })
}

/// Value in [0, 1) drawn from a fixed slice of the seed.
fn unit(seed: u64, slot: u32) -> f64 {
    ((seed >> (slot * 8)) & 0xff) as f64 / 256.0
}

#[async_trait::async_trait]
impl MarketResearch for StubAnalysisProvider {
    async fn market_research(&self, instrument: &Instrument) -> ProviderResult<MarketFindings> {
        let s = seed(instrument);
        Ok(MarketFindings {
            company_name: Some(format!("Stub {instrument}")),
            narrative: format!("Placeholder market research for {instrument}."),
            sentiment: unit(s, 0) * 2.0 - 1.0,
            growth_outlook_pct: unit(s, 1) * 40.0 - 10.0,
            confidence: 0.5 + unit(s, 2) * 0.5,
        })
    }
}

#[async_trait::async_trait]
impl FinancialReview for StubAnalysisProvider {
    async fn financial_review(&self, instrument: &Instrument) -> ProviderResult<FinancialMetrics> {
        let s = seed(instrument);
        Ok(FinancialMetrics {
            narrative: format!("Placeholder financial review for {instrument}."),
            revenue_growth_pct: unit(s, 3) * 50.0 - 10.0,
            profit_margin_pct: unit(s, 4) * 40.0 - 5.0,
            return_on_equity_pct: unit(s, 5) * 40.0 - 5.0,
            debt_to_equity: unit(s, 6) * 2.5,
            confidence: 0.5 + unit(s, 7) * 0.5,
        })
    }
}

#[async_trait::async_trait]
impl RiskAssessment for StubAnalysisProvider {
    async fn risk_assessment(&self, instrument: &Instrument) -> ProviderResult<RiskMetrics> {
        let s = seed(instrument).rotate_left(17);
        Ok(RiskMetrics {
            narrative: format!("Placeholder risk assessment for {instrument}."),
            risk_rating: unit(s, 0) * 10.0,
            volatility_pct: 10.0 + unit(s, 1) * 60.0,
            max_drawdown_pct: unit(s, 2) * 50.0,
            confidence: 0.5 + unit(s, 3) * 0.5,
        })
    }
}
