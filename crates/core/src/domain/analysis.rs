use crate::domain::instrument::Instrument;
use crate::error::{FailureKind, ProviderErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketFindings {
    #[serde(default)]
    pub company_name: Option<String>,
    pub narrative: String,
    /// [-1, 1], bearish to bullish.
    pub sentiment: f64,
    /// Expected growth over the provider's horizon, in percent.
    pub growth_outlook_pct: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialMetrics {
    pub narrative: String,
    pub revenue_growth_pct: f64,
    pub profit_margin_pct: f64,
    pub return_on_equity_pct: f64,
    pub debt_to_equity: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub narrative: String,
    /// [0, 10], 10 is the riskiest.
    pub risk_rating: f64,
    pub volatility_pct: f64,
    pub max_drawdown_pct: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Component {
    MarketResearch,
    FinancialReview,
    RiskAssessment,
}

impl Component {
    pub const ALL: [Component; 3] = [
        Component::MarketResearch,
        Component::FinancialReview,
        Component::RiskAssessment,
    ];
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Component::MarketResearch => "market-research",
            Component::FinancialReview => "financial-review",
            Component::RiskAssessment => "risk-assessment",
        };
        f.write_str(s)
    }
}

/// A sub-call that exhausted its retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentError {
    pub component: Component,
    pub kind: ProviderErrorKind,
    pub message: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum AnalysisStatus {
    Complete,
    Partial,
    Failed { kind: FailureKind },
}

impl AnalysisStatus {
    pub fn is_success(&self) -> bool {
        !matches!(self, AnalysisStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub instrument: Instrument,
    pub market: Option<MarketFindings>,
    pub financial: Option<FinancialMetrics>,
    pub risk: Option<RiskMetrics>,
    /// Mean provider confidence over present components.
    pub confidence: Option<f64>,
    pub status: AnalysisStatus,
    pub errors: Vec<ComponentError>,
    /// Human-readable cause when the whole instrument failed outside the
    /// provider calls (e.g. the global deadline).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AnalysisResult {
    /// Assembles a result from per-component outcomes. Status is derived from
    /// which components are present; for a wholly failed instrument the first
    /// error in component order decides the recorded kind.
    pub fn assemble(
        instrument: Instrument,
        market: Option<MarketFindings>,
        financial: Option<FinancialMetrics>,
        risk: Option<RiskMetrics>,
        mut errors: Vec<ComponentError>,
    ) -> Self {
        errors.sort_by_key(|e| e.component);

        let confidences: Vec<f64> = [
            market.as_ref().map(|m| m.confidence),
            financial.as_ref().map(|f| f.confidence),
            risk.as_ref().map(|r| r.confidence),
        ]
        .into_iter()
        .flatten()
        .map(clamp_unit)
        .collect();

        let confidence = if confidences.is_empty() {
            None
        } else {
            Some(confidences.iter().sum::<f64>() / confidences.len() as f64)
        };

        let status = match confidences.len() {
            3 => AnalysisStatus::Complete,
            0 => AnalysisStatus::Failed {
                kind: errors
                    .first()
                    .map(|e| FailureKind::from(e.kind))
                    .unwrap_or(FailureKind::InstrumentFailed),
            },
            _ => AnalysisStatus::Partial,
        };

        Self {
            instrument,
            market,
            financial,
            risk,
            confidence,
            status,
            errors,
            detail: None,
        }
    }

    /// A result for an instrument that never produced one of its own.
    pub fn failed(instrument: Instrument, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            instrument,
            market: None,
            financial: None,
            risk: None,
            confidence: None,
            status: AnalysisStatus::Failed { kind },
            errors: Vec::new(),
            detail: Some(detail.into()),
        }
    }

    pub fn present_components(&self) -> Vec<Component> {
        let mut out = Vec::with_capacity(3);
        if self.market.is_some() {
            out.push(Component::MarketResearch);
        }
        if self.financial.is_some() {
            out.push(Component::FinancialReview);
        }
        if self.risk.is_some() {
            out.push(Component::RiskAssessment);
        }
        out
    }

    pub fn missing_components(&self) -> Vec<Component> {
        let present = self.present_components();
        Component::ALL
            .into_iter()
            .filter(|c| !present.contains(c))
            .collect()
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
