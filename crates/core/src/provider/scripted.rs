//! In-memory provider with per-instrument scripts, for engine tests.

use crate::domain::analysis::fixtures;
use crate::domain::{Component, FinancialMetrics, Instrument, MarketFindings, RiskMetrics};
use crate::error::{ProviderError, ProviderErrorKind, ProviderResult};
use crate::provider::{AnalysisProviders, FinancialReview, MarketResearch, RiskAssessment};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Step {
    Fail(ProviderErrorKind),
    Delay(Duration),
    /// Sticky: every call fails with this kind.
    FailAlways(ProviderErrorKind),
    /// Sticky: every call sleeps for an hour.
    Hang,
}

#[derive(Debug, Clone)]
pub(crate) struct Profile {
    pub market: MarketFindings,
    pub financial: FinancialMetrics,
    pub risk: RiskMetrics,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            market: fixtures::market(0.2, 5.0, 0.8),
            financial: fixtures::financial(10.0, 0.8),
            risk: fixtures::risk(4.0, 0.8),
        }
    }
}

type Key = (Instrument, Component);

#[derive(Debug, Default)]
pub(crate) struct ScriptedProvider {
    profiles: Mutex<HashMap<Instrument, Profile>>,
    scripts: Mutex<HashMap<Key, VecDeque<Step>>>,
    calls: Mutex<HashMap<Key, u32>>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

pub(crate) fn inst(symbol: &str) -> Instrument {
    Instrument::parse(symbol).unwrap()
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_profile(self, symbol: &str, profile: Profile) -> Self {
        self.profiles.lock().unwrap().insert(inst(symbol), profile);
        self
    }

    pub fn script(self, symbol: &str, component: Component, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert((inst(symbol), component), steps.into());
        self
    }

    pub fn fail_all(self, symbol: &str, kind: ProviderErrorKind) -> Self {
        Component::ALL.into_iter().fold(self, |p, c| {
            p.script(symbol, c, vec![Step::FailAlways(kind)])
        })
    }

    pub fn hang_all(self, symbol: &str) -> Self {
        Component::ALL
            .into_iter()
            .fold(self, |p, c| p.script(symbol, c, vec![Step::Hang]))
    }

    pub fn calls(&self, symbol: &str, component: Component) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(&(inst(symbol), component))
            .copied()
            .unwrap_or(0)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn into_providers(self) -> (Arc<Self>, AnalysisProviders) {
        let shared = Arc::new(self);
        (shared.clone(), AnalysisProviders::from_single(shared))
    }

    fn next_step(&self, key: &Key) -> Option<Step> {
        *self.calls.lock().unwrap().entry(key.clone()).or_insert(0) += 1;
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.get_mut(key)?;
        match queue.front().copied() {
            Some(step @ (Step::FailAlways(_) | Step::Hang)) => Some(step),
            _ => queue.pop_front(),
        }
    }

    fn profile(&self, instrument: &Instrument) -> Profile {
        self.profiles
            .lock()
            .unwrap()
            .get(instrument)
            .cloned()
            .unwrap_or_default()
    }

    async fn run_step(&self, instrument: &Instrument, component: Component) -> ProviderResult<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let outcome = match self.next_step(&(instrument.clone(), component)) {
            None => Ok(()),
            Some(Step::Fail(kind) | Step::FailAlways(kind)) => {
                Err(ProviderError::new(kind, format!("scripted {component} failure")))
            }
            Some(Step::Delay(d)) => {
                tokio::time::sleep(d).await;
                Ok(())
            }
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

#[async_trait::async_trait]
impl MarketResearch for ScriptedProvider {
    async fn market_research(&self, instrument: &Instrument) -> ProviderResult<MarketFindings> {
        self.run_step(instrument, Component::MarketResearch).await?;
        Ok(self.profile(instrument).market)
    }
}

#[async_trait::async_trait]
impl FinancialReview for ScriptedProvider {
    async fn financial_review(&self, instrument: &Instrument) -> ProviderResult<FinancialMetrics> {
        self.run_step(instrument, Component::FinancialReview).await?;
        Ok(self.profile(instrument).financial)
    }
}

#[async_trait::async_trait]
impl RiskAssessment for ScriptedProvider {
    async fn risk_assessment(&self, instrument: &Instrument) -> ProviderResult<RiskMetrics> {
        self.run_step(instrument, Component::RiskAssessment).await?;
        Ok(self.profile(instrument).risk)
    }
}
