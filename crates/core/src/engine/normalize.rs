//! Maps heterogeneous provider metrics onto one comparable [0, 100] scale.
//!
//! Scoring policy:
//! - market score: mean of sentiment ([-1, 1]) and growth outlook
//!   ([-25 %, +25 %]), each mapped linearly onto [0, 100];
//! - financial score: 0.30 revenue growth ([-20, 40] %), 0.25 profit margin
//!   ([-10, 40] %), 0.25 return on equity ([-10, 40] %), 0.20 inverted
//!   leverage (debt/equity [0, 3]);
//! - growth sub-score: market 0.4 and financial 0.6, over whichever is present;
//! - risk sub-score (higher is safer): 0.5 inverted rating ([0, 10]), 0.3
//!   inverted volatility ([10, 80] %), 0.2 inverted drawdown ([0, 60] %);
//! - confidence sub-score: 100 x combined provider confidence;
//! - composite: growth/risk/confidence per [`ScoringWeights`], renormalized
//!   over the present sub-scores and clipped to [0, 100].
//!
//! Each linear map clips to its range; non-finite inputs map to the neutral 50.
//! A partial result is flagged `low_confidence` so later stages can discount it.

use crate::domain::{
    AnalysisResult, AnalysisStatus, FinancialMetrics, Instrument, MarketFindings, NormalizedScore, RiskMetrics,
    SubScores,
};
use crate::error::PipelineError;
use crate::text;
use std::collections::BTreeMap;

pub const SCORE_MIN: f64 = 0.0;
pub const SCORE_MAX: f64 = 100.0;

const MARKET_IN_GROWTH: f64 = 0.4;
const FINANCIAL_IN_GROWTH: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub growth: f64,
    pub risk: f64,
    pub confidence: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            growth: 0.5,
            risk: 0.3,
            confidence: 0.2,
        }
    }
}

impl ScoringWeights {
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (name, w) in [
            ("growth", self.growth),
            ("risk", self.risk),
            ("confidence", self.confidence),
        ] {
            if !(w.is_finite() && w > 0.0) {
                return Err(PipelineError::ConfigInvalid(format!(
                    "scoring weight {name} must be positive (got {w})"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScoreNormalizer {
    weights: ScoringWeights,
}

impl ScoreNormalizer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// Scores every non-failed result. Pure: the same input always yields the
    /// same output.
    pub fn normalize(
        &self,
        results: &BTreeMap<Instrument, AnalysisResult>,
    ) -> BTreeMap<Instrument, NormalizedScore> {
        results
            .values()
            .filter_map(|r| self.score(r))
            .map(|s| (s.instrument.clone(), s))
            .collect()
    }

    pub fn score(&self, result: &AnalysisResult) -> Option<NormalizedScore> {
        if !result.status.is_success() {
            return None;
        }
        let present = result.present_components().len();
        if present == 0 {
            return None;
        }

        let market = result.market.as_ref().map(market_score);
        let financial = result.financial.as_ref().map(financial_score);
        let growth = weighted_mean(&[
            (market, MARKET_IN_GROWTH),
            (financial, FINANCIAL_IN_GROWTH),
        ]);
        let risk = result.risk.as_ref().map(risk_score);
        let confidence = result.confidence.unwrap_or(0.0).clamp(0.0, 1.0);
        let confidence_sub = Some(confidence * 100.0);

        let composite = weighted_mean(&[
            (growth, self.weights.growth),
            (risk, self.weights.risk),
            (confidence_sub, self.weights.confidence),
        ])
        .unwrap_or(SCORE_MIN)
        .clamp(SCORE_MIN, SCORE_MAX);

        let mut rationale = Vec::new();
        if let Some(m) = &result.market {
            rationale.extend(text::rationale_lines(&m.narrative));
        }
        if let Some(f) = &result.financial {
            rationale.extend(text::rationale_lines(&f.narrative));
        }
        let risk_notes = result
            .risk
            .as_ref()
            .map(|r| text::normalize_text_block(&r.narrative))
            .filter(|s| !s.is_empty());

        Some(NormalizedScore {
            instrument: result.instrument.clone(),
            score: composite,
            sub_scores: SubScores {
                growth,
                risk,
                confidence: confidence_sub,
            },
            confidence,
            low_confidence: result.status == AnalysisStatus::Partial,
            status: result.status,
            company_name: result
                .market
                .as_ref()
                .and_then(|m| m.company_name.as_ref())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            rationale,
            risk_notes,
        })
    }
}

/// Linear map of `value` from [lo, hi] onto [0, 100], clipped.
fn scale(value: f64, lo: f64, hi: f64) -> f64 {
    if !value.is_finite() {
        return 50.0;
    }
    ((value - lo) / (hi - lo) * 100.0).clamp(SCORE_MIN, SCORE_MAX)
}

fn market_score(m: &MarketFindings) -> f64 {
    0.5 * scale(m.sentiment, -1.0, 1.0) + 0.5 * scale(m.growth_outlook_pct, -25.0, 25.0)
}

fn financial_score(f: &FinancialMetrics) -> f64 {
    0.30 * scale(f.revenue_growth_pct, -20.0, 40.0)
        + 0.25 * scale(f.profit_margin_pct, -10.0, 40.0)
        + 0.25 * scale(f.return_on_equity_pct, -10.0, 40.0)
        + 0.20 * (100.0 - scale(f.debt_to_equity, 0.0, 3.0))
}

fn risk_score(r: &RiskMetrics) -> f64 {
    0.5 * (100.0 - scale(r.risk_rating, 0.0, 10.0))
        + 0.3 * (100.0 - scale(r.volatility_pct, 10.0, 80.0))
        + 0.2 * (100.0 - scale(r.max_drawdown_pct, 0.0, 60.0))
}

/// Weighted mean over the present values, weights rescaled among them.
fn weighted_mean(parts: &[(Option<f64>, f64)]) -> Option<f64> {
    let (sum, total) = parts
        .iter()
        .filter_map(|(v, w)| v.map(|v| (v * w, *w)))
        .fold((0.0, 0.0), |(s, t), (vw, w)| (s + vw, t + w));
    if total > 0.0 {
        Some(sum / total)
    } else {
        None
    }
}
