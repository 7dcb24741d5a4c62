use crate::config::Settings;
use crate::domain::{FinancialMetrics, Instrument, MarketFindings, RiskMetrics};
use crate::error::{ProviderError, ProviderResult};
use crate::provider::{FinancialReview, MarketResearch, RiskAssessment};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MARKET_RESEARCH_PATH: &str = "/v1/market_research";
const FINANCIAL_REVIEW_PATH: &str = "/v1/financial_review";
const RISK_ASSESSMENT_PATH: &str = "/v1/risk_assessment";

/// Talks to an analysis service exposing one JSON endpoint per capability.
/// Retries are left to the task runner; this type makes exactly one request
/// per call.
#[derive(Debug, Clone)]
pub struct HttpJsonAnalysisProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpJsonAnalysisProvider {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let base_url = settings.require_analysis_provider_base_url()?.to_string();
        let timeout_secs = settings
            .analysis_provider_timeout_secs
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build analysis provider http client")?;

        Ok(Self {
            http,
            base_url,
            api_key: settings.analysis_provider_api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> ProviderResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            let value = HeaderValue::from_str(api_key)
                .map_err(|e| ProviderError::provider(format!("invalid api key header: {e}")))?;
            headers.insert("x-api-key", value);
        }
        Ok(headers)
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str, instrument: &Instrument) -> ProviderResult<T> {
        let res = self
            .http
            .get(self.url(path))
            .headers(self.headers()?)
            .query(&[("symbol", instrument.as_str())])
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        if !status.is_success() {
            return Err(classify_status(status, &text));
        }

        parse_body(&text)
    }
}

fn classify_transport_error(err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::timeout(err.to_string())
    } else {
        ProviderError::provider(format!("analysis provider request failed: {err}"))
    }
}

fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let message = format!("analysis provider HTTP {status}: {body}");
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::rate_limited(message),
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
            ProviderError::invalid_instrument(message)
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ProviderError::timeout(message),
        _ => ProviderError::provider(message),
    }
}

fn parse_body<T: DeserializeOwned>(text: &str) -> ProviderResult<T> {
    serde_json::from_str::<T>(text).map_err(|e| {
        ProviderError::provider(format!("analysis provider response has unexpected shape ({e}): {text}"))
    })
}

#[async_trait::async_trait]
impl MarketResearch for HttpJsonAnalysisProvider {
    async fn market_research(&self, instrument: &Instrument) -> ProviderResult<MarketFindings> {
        self.fetch(MARKET_RESEARCH_PATH, instrument).await
    }
}

#[async_trait::async_trait]
impl FinancialReview for HttpJsonAnalysisProvider {
    async fn financial_review(&self, instrument: &Instrument) -> ProviderResult<FinancialMetrics> {
        self.fetch(FINANCIAL_REVIEW_PATH, instrument).await
    }
}

#[async_trait::async_trait]
impl RiskAssessment for HttpJsonAnalysisProvider {
    async fn risk_assessment(&self, instrument: &Instrument) -> ProviderResult<RiskMetrics> {
        self.fetch(RISK_ASSESSMENT_PATH, instrument).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorKind;
    use serde_json::json;

    #[test]
    fn parses_market_findings_with_optional_company_name() {
        let v = json!({
            "narrative": "Cloud demand is accelerating.",
            "sentiment": 0.4,
            "growth_outlook_pct": 12.5,
            "confidence": 0.8
        });
        let parsed: MarketFindings = parse_body(&v.to_string()).unwrap();
        assert!(parsed.company_name.is_none());
        assert_eq!(parsed.growth_outlook_pct, 12.5);
    }

    #[test]
    fn rejects_non_numeric_metrics() {
        let v = json!({
            "narrative": "x",
            "risk_rating": "high",
            "volatility_pct": 30.0,
            "max_drawdown_pct": 12.0,
            "confidence": 0.5
        });
        let err = parse_body::<RiskMetrics>(&v.to_string()).unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::ProviderError);
    }

    #[test]
    fn maps_status_codes_to_error_kinds() {
        let kind = |s: StatusCode| classify_status(s, "{}").kind;
        assert_eq!(kind(StatusCode::TOO_MANY_REQUESTS), ProviderErrorKind::RateLimited);
        assert_eq!(kind(StatusCode::NOT_FOUND), ProviderErrorKind::InvalidInstrument);
        assert_eq!(kind(StatusCode::UNPROCESSABLE_ENTITY), ProviderErrorKind::InvalidInstrument);
        assert_eq!(kind(StatusCode::GATEWAY_TIMEOUT), ProviderErrorKind::Timeout);
        assert_eq!(kind(StatusCode::BAD_GATEWAY), ProviderErrorKind::ProviderError);
    }

    #[test]
    fn builds_url_without_double_slash() {
        let settings = Settings {
            analysis_provider_base_url: Some("http://localhost:8080/".to_string()),
            analysis_provider_api_key: None,
            analysis_provider_timeout_secs: Some(5),
            sentry_dsn: None,
        };
        let provider = HttpJsonAnalysisProvider::from_settings(&settings).unwrap();
        assert_eq!(
            provider.url(RISK_ASSESSMENT_PATH),
            "http://localhost:8080/v1/risk_assessment"
        );
    }

    #[test]
    fn requires_base_url() {
        let settings = Settings {
            analysis_provider_base_url: None,
            analysis_provider_api_key: None,
            analysis_provider_timeout_secs: None,
            sentry_dsn: None,
        };
        assert!(HttpJsonAnalysisProvider::from_settings(&settings).is_err());
    }
}
