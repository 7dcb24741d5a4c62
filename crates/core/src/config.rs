use crate::engine::allocate::AllocationConstraints;
use crate::engine::normalize::ScoringWeights;
use crate::engine::retry::RetryPolicy;
use crate::error::PipelineError;
use anyhow::Context;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MAX_CONCURRENCY: usize = 8;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_PER_INSTRUMENT_CAP: f64 = 0.25;
pub const DEFAULT_MIN_DIVERSIFICATION: usize = 3;
pub const DEFAULT_CONFIDENCE_FLOOR_RANK: usize = 1;
pub const DEFAULT_MIN_SUCCESS_THRESHOLD: usize = 1;
pub const DEFAULT_LOW_CONFIDENCE_DISCOUNT: f64 = 0.5;

const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_GLOBAL_TIMEOUT_SECS: u64 = 300;
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 250;
const DEFAULT_MAX_BACKOFF_MS: u64 = 5_000;

#[derive(Debug, Clone)]
pub struct Settings {
    pub analysis_provider_base_url: Option<String>,
    pub analysis_provider_api_key: Option<String>,
    pub analysis_provider_timeout_secs: Option<u64>,
    pub sentry_dsn: Option<String>,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            analysis_provider_base_url: std::env::var("ANALYSIS_PROVIDER_BASE_URL").ok(),
            analysis_provider_api_key: std::env::var("ANALYSIS_PROVIDER_API_KEY").ok(),
            analysis_provider_timeout_secs: env_parse("ANALYSIS_PROVIDER_TIMEOUT_SECS"),
            sentry_dsn: std::env::var("SENTRY_DSN").ok(),
        })
    }

    pub fn require_analysis_provider_base_url(&self) -> anyhow::Result<&str> {
        self.analysis_provider_base_url
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .context("ANALYSIS_PROVIDER_BASE_URL is required")
    }
}

/// Knobs for one pipeline run. Every retry, backoff and timeout value is an
/// explicit input here rather than a default buried in a call site.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Explicit in-flight bound. `None` means the instrument count capped at
    /// `max_concurrency`.
    pub concurrency_limit: Option<usize>,
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub call_timeout: Duration,
    pub global_timeout: Duration,
    pub per_instrument_cap: f64,
    pub min_diversification: usize,
    /// 0 disables the floor.
    pub confidence_floor_rank: usize,
    pub min_success_threshold: usize,
    pub low_confidence_discount: f64,
    pub scoring: ScoringWeights,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: None,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
            global_timeout: Duration::from_secs(DEFAULT_GLOBAL_TIMEOUT_SECS),
            per_instrument_cap: DEFAULT_PER_INSTRUMENT_CAP,
            min_diversification: DEFAULT_MIN_DIVERSIFICATION,
            confidence_floor_rank: DEFAULT_CONFIDENCE_FLOOR_RANK,
            min_success_threshold: DEFAULT_MIN_SUCCESS_THRESHOLD,
            low_confidence_discount: DEFAULT_LOW_CONFIDENCE_DISCOUNT,
            scoring: ScoringWeights::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with `PIPELINE_*` environment variables. Values that
    /// fail to parse are ignored.
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Some(n) = env_parse::<usize>("PIPELINE_CONCURRENCY_LIMIT") {
            out.concurrency_limit = Some(n);
        }
        if let Some(n) = env_parse("PIPELINE_MAX_CONCURRENCY") {
            out.max_concurrency = n;
        }
        if let Some(n) = env_parse("PIPELINE_MAX_RETRIES") {
            out.max_retries = n;
        }
        if let Some(ms) = env_parse("PIPELINE_CALL_TIMEOUT_MS") {
            out.call_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse("PIPELINE_GLOBAL_TIMEOUT_SECS") {
            out.global_timeout = Duration::from_secs(secs);
        }
        if let Some(cap) = env_parse("PIPELINE_PER_INSTRUMENT_CAP") {
            out.per_instrument_cap = cap;
        }
        if let Some(n) = env_parse("PIPELINE_MIN_DIVERSIFICATION") {
            out.min_diversification = n;
        }
        if let Some(n) = env_parse("PIPELINE_CONFIDENCE_FLOOR_RANK") {
            out.confidence_floor_rank = n;
        }
        if let Some(n) = env_parse("PIPELINE_MIN_SUCCESS_THRESHOLD") {
            out.min_success_threshold = n;
        }
        if let Some(d) = env_parse("PIPELINE_LOW_CONFIDENCE_DISCOUNT") {
            out.low_confidence_discount = d;
        }

        out
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: self.initial_backoff,
            max_backoff: self.max_backoff,
            backoff_multiplier: 2.0,
        }
    }

    pub fn allocation_constraints(&self) -> AllocationConstraints {
        AllocationConstraints {
            per_instrument_cap: self.per_instrument_cap,
            min_diversification: self.min_diversification,
            low_confidence_discount: self.low_confidence_discount,
        }
    }

    pub fn effective_concurrency(&self, instruments: usize) -> usize {
        self.concurrency_limit
            .unwrap_or_else(|| instruments.min(self.max_concurrency))
            .max(1)
    }

    /// Checks the configuration against a run over `requested` instruments.
    pub fn validate(&self, requested: usize) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::ConfigInvalid(msg));

        let cap = self.per_instrument_cap;
        if !(cap.is_finite() && cap > 0.0 && cap <= 1.0) {
            return invalid(format!("per_instrument_cap must be in (0, 1] (got {cap})"));
        }
        if self.min_diversification < 1 {
            return invalid("min_diversification must be >= 1".to_string());
        }
        if self.concurrency_limit == Some(0) {
            return invalid("concurrency_limit must be >= 1".to_string());
        }
        if self.max_concurrency == 0 {
            return invalid("max_concurrency must be >= 1".to_string());
        }
        if self.global_timeout.is_zero() {
            return invalid("global_timeout must be non-zero".to_string());
        }
        if self.call_timeout.is_zero() {
            return invalid("call_timeout must be non-zero".to_string());
        }
        if self.max_backoff < self.initial_backoff {
            return invalid("max_backoff must be >= initial_backoff".to_string());
        }
        let discount = self.low_confidence_discount;
        if !(discount.is_finite() && discount > 0.0 && discount <= 1.0) {
            return invalid(format!(
                "low_confidence_discount must be in (0, 1] (got {discount})"
            ));
        }
        self.scoring.validate()?;
        if self.min_success_threshold > requested {
            return invalid(format!(
                "min_success_threshold {} exceeds the {requested} requested instruments",
                self.min_success_threshold
            ));
        }
        // Too few instruments for the cap is not an error here: the
        // allocator records a waiver and funds the book at 1/K instead.
        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}
