use crate::domain::{Instrument, NormalizedScore, RankedEntry};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Orders scored instruments. The sort key is score descending, then
/// confidence descending, then instrument ascending; instruments are unique,
/// so no two entries compare equal.
///
/// With `confidence_floor_rank = k > 0`, the first `k` positions are reserved
/// for non-low-confidence entries as long as enough of them exist. Low-confidence
/// entries pushed out of those positions are flagged `demoted`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ranker {
    confidence_floor_rank: usize,
}

impl Ranker {
    pub fn new(confidence_floor_rank: usize) -> Self {
        Self {
            confidence_floor_rank,
        }
    }

    pub fn rank(&self, scores: &BTreeMap<Instrument, NormalizedScore>) -> Vec<RankedEntry> {
        let mut sorted: Vec<&NormalizedScore> = scores.values().collect();
        sorted.sort_by(|a, b| compare(a, b));

        let ordered = self.apply_confidence_floor(&sorted);

        ordered
            .into_iter()
            .enumerate()
            .map(|(idx, (score, demoted))| RankedEntry {
                rank: idx + 1,
                instrument: score.instrument.clone(),
                score: score.clone(),
                demoted,
            })
            .collect()
    }

    fn apply_confidence_floor<'a>(
        &self,
        sorted: &[&'a NormalizedScore],
    ) -> Vec<(&'a NormalizedScore, bool)> {
        let k = self.confidence_floor_rank;
        if k == 0 {
            return sorted.iter().map(|s| (*s, false)).collect();
        }

        let reserved: Vec<&NormalizedScore> = sorted
            .iter()
            .copied()
            .filter(|s| !s.low_confidence)
            .take(k)
            .collect();

        let mut out: Vec<(&NormalizedScore, bool)> = Vec::with_capacity(sorted.len());
        out.extend(reserved.iter().map(|s| (*s, false)));

        for (raw_pos, s) in sorted.iter().enumerate() {
            if reserved.iter().any(|r| r.instrument == s.instrument) {
                continue;
            }
            let demoted = s.low_confidence && out.len() > raw_pos;
            out.push((*s, demoted));
        }

        out
    }
}

fn compare(a: &NormalizedScore, b: &NormalizedScore) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.confidence.total_cmp(&a.confidence))
        .then_with(|| a.instrument.cmp(&b.instrument))
}
