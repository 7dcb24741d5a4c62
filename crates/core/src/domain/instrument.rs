use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Ticker-like identifier, unique within a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instrument(String);

impl Instrument {
    /// Trims and upper-cases `raw`. Returns `None` for blank input or input with
    /// embedded whitespace/control characters.
    pub fn parse(raw: &str) -> Option<Self> {
        let symbol = raw.trim();
        if symbol.is_empty() {
            return None;
        }
        if symbol
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return None;
        }
        Some(Self(symbol.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Instrument {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalizes a caller-supplied symbol list: blanks are dropped, duplicates are
/// dropped keeping the first occurrence, malformed symbols are rejected.
pub fn normalize_instruments<S: AsRef<str>>(symbols: &[S]) -> Result<Vec<Instrument>, PipelineError> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(symbols.len());

    for raw in symbols {
        let raw = raw.as_ref();
        if raw.trim().is_empty() {
            continue;
        }
        let instrument = Instrument::parse(raw).ok_or_else(|| {
            PipelineError::ConfigInvalid(format!("malformed instrument symbol: {raw:?}"))
        })?;
        if seen.insert(instrument.clone()) {
            out.push(instrument);
        } else {
            tracing::warn!(instrument = %instrument, "duplicate instrument dropped");
        }
    }

    if out.is_empty() {
        return Err(PipelineError::ConfigInvalid(
            "at least one ticker symbol is required".to_string(),
        ));
    }

    Ok(out)
}
