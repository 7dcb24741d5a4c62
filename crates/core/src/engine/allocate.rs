use crate::domain::{Allocation, AllocationPlan, CapWaiver, CapWaiverReason, RankedEntry};
use crate::error::FailureKind;

const WEIGHT_EPSILON: f64 = 1e-9;
/// Smallest conviction a selected entry can carry, in score points.
const MIN_CONVICTION: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AllocationConstraints {
    pub per_instrument_cap: f64,
    pub min_diversification: usize,
    /// Multiplier applied to a low-confidence entry's score before weighting.
    pub low_confidence_discount: f64,
}

impl Default for AllocationConstraints {
    fn default() -> Self {
        Self {
            per_instrument_cap: crate::config::DEFAULT_PER_INSTRUMENT_CAP,
            min_diversification: crate::config::DEFAULT_MIN_DIVERSIFICATION,
            low_confidence_discount: crate::config::DEFAULT_LOW_CONFIDENCE_DISCOUNT,
        }
    }
}

impl AllocationConstraints {
    /// Smallest K with cap * K >= 1.
    fn min_count_for_cap(&self) -> usize {
        let k = (1.0 / self.per_instrument_cap - WEIGHT_EPSILON).ceil();
        if k.is_finite() && k >= 1.0 {
            k as usize
        } else {
            1
        }
    }

    fn conviction(&self, entry: &RankedEntry) -> f64 {
        let mut c = entry.score.score;
        if entry.score.low_confidence {
            c *= self.low_confidence_discount;
        }
        c.max(MIN_CONVICTION)
    }
}

/// Turns a ranking into portfolio weights.
///
/// The top K entries are selected, K = max(min_diversification, ceil(1 / cap))
/// bounded by what is available. Weights start proportional to conviction and
/// are then clipped to the cap with the excess spread over the uncapped
/// entries, repeated until nothing exceeds the cap.
#[derive(Debug, Clone, Copy, Default)]
pub struct Allocator {
    constraints: AllocationConstraints,
}

impl Allocator {
    pub fn new(constraints: AllocationConstraints) -> Self {
        Self { constraints }
    }

    pub fn allocate(&self, ranked: &[RankedEntry]) -> AllocationPlan {
        let cap = self.constraints.per_instrument_cap;
        if ranked.is_empty() {
            return AllocationPlan::empty(cap, FailureKind::InsufficientSuccesses);
        }

        let k = self
            .constraints
            .min_diversification
            .max(self.constraints.min_count_for_cap())
            .min(ranked.len());
        let selected = &ranked[..k];

        let (effective_cap, cap_waiver) = if k == 1 {
            let waiver = (cap < 1.0).then_some(CapWaiver {
                effective_cap: 1.0,
                reason: CapWaiverReason::SingleSurvivor,
            });
            (1.0, waiver)
        } else if cap * (k as f64) < 1.0 - WEIGHT_EPSILON {
            let effective = 1.0 / k as f64;
            (
                effective,
                Some(CapWaiver {
                    effective_cap: effective,
                    reason: CapWaiverReason::TooFewSurvivors,
                }),
            )
        } else {
            (cap, None)
        };

        if let Some(waiver) = &cap_waiver {
            tracing::warn!(
                requested_cap = cap,
                effective_cap = waiver.effective_cap,
                reason = ?waiver.reason,
                selected = k,
                "per-instrument cap waived"
            );
        }

        let convictions: Vec<f64> = selected
            .iter()
            .map(|e| self.constraints.conviction(e))
            .collect();
        let (weights, capped) = clip_and_redistribute(&convictions, effective_cap);

        let allocations = selected
            .iter()
            .zip(weights)
            .zip(capped)
            .map(|((entry, weight), capped)| Allocation {
                instrument: entry.instrument.clone(),
                rank: entry.rank,
                weight,
                capped,
            })
            .collect();

        AllocationPlan {
            allocations,
            per_instrument_cap: cap,
            cap_waiver,
            empty_reason: None,
        }
    }
}

/// Proportional weights summing to 1 with none above `cap`. Requires
/// `cap * convictions.len() >= 1`.
fn clip_and_redistribute(convictions: &[f64], cap: f64) -> (Vec<f64>, Vec<bool>) {
    let n = convictions.len();
    let mut weights = vec![0.0; n];
    let mut capped = vec![false; n];

    loop {
        let capped_count = capped.iter().filter(|c| **c).count();
        let remaining = (1.0 - cap * capped_count as f64).max(0.0);
        let free_total: f64 = convictions
            .iter()
            .zip(&capped)
            .filter(|(_, c)| !**c)
            .map(|(v, _)| *v)
            .sum();
        let free_count = n - capped_count;

        for i in 0..n {
            weights[i] = if capped[i] {
                cap
            } else if free_total > 0.0 {
                remaining * convictions[i] / free_total
            } else {
                remaining / free_count as f64
            };
        }

        let over: Vec<usize> = (0..n)
            .filter(|&i| !capped[i] && weights[i] > cap + WEIGHT_EPSILON)
            .collect();
        if over.is_empty() {
            break;
        }
        for i in over {
            capped[i] = true;
            weights[i] = cap;
        }
        if capped.iter().all(|c| *c) {
            break;
        }
    }

    (weights, capped)
}
