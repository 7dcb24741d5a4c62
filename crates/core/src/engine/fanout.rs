use crate::domain::{AnalysisResult, Instrument};
use crate::engine::runner::AnalysisTaskRunner;
use crate::error::FailureKind;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

#[derive(Debug, Clone)]
pub struct FanOutOutcome {
    /// Exactly one entry per requested instrument.
    pub results: BTreeMap<Instrument, AnalysisResult>,
    pub timed_out: bool,
}

impl FanOutOutcome {
    pub fn successes(&self) -> usize {
        self.results
            .values()
            .filter(|r| r.status.is_success())
            .count()
    }
}

/// Runs one analysis task per instrument with a bounded number in flight.
///
/// Workers never touch the result map: each sends its finished result over a
/// channel and the collector loop is the only writer, inserting each key once.
#[derive(Debug, Clone)]
pub struct FanOutCoordinator {
    runner: Arc<AnalysisTaskRunner>,
}

impl FanOutCoordinator {
    pub fn new(runner: AnalysisTaskRunner) -> Self {
        Self {
            runner: Arc::new(runner),
        }
    }

    pub async fn run_all(
        &self,
        instruments: &[Instrument],
        concurrency_limit: usize,
        global_timeout: Duration,
    ) -> FanOutOutcome {
        let limit = concurrency_limit.max(1);
        let semaphore = Arc::new(Semaphore::new(limit));
        let (tx, mut rx) = mpsc::channel::<AnalysisResult>(instruments.len().max(1));
        let mut tasks = JoinSet::new();

        tracing::info!(
            instruments = instruments.len(),
            concurrency_limit = limit,
            global_timeout_ms = global_timeout.as_millis() as u64,
            "fan-out started"
        );

        for instrument in instruments.iter().cloned() {
            let runner = self.runner.clone();
            let semaphore = semaphore.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                // The semaphore is never closed while tasks are alive.
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let result = runner.analyze(&instrument).await;
                // Receiver gone means the deadline passed; the result is discarded.
                let _ = tx.send(result).await;
            });
        }
        drop(tx);

        let mut results: BTreeMap<Instrument, AnalysisResult> = BTreeMap::new();
        let deadline = tokio::time::sleep(global_timeout);
        tokio::pin!(deadline);
        let mut timed_out = false;

        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(result) => collect(&mut results, result),
                    None => break,
                },
                _ = &mut deadline => {
                    timed_out = true;
                    break;
                }
            }
        }

        if timed_out {
            // In-flight provider calls are dropped at their next await point.
            tasks.abort_all();
            drain_buffered(&mut rx, &mut results);
            tracing::warn!(
                completed = results.len(),
                pending = instruments.len().saturating_sub(results.len()),
                "global timeout elapsed; abandoning pending analyses"
            );
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                if err.is_panic() {
                    tracing::error!(error = %err, "analysis task panicked");
                }
            }
        }

        for instrument in instruments {
            if results.contains_key(instrument) {
                continue;
            }
            let result = if timed_out {
                AnalysisResult::failed(
                    instrument.clone(),
                    FailureKind::ProviderTimeout,
                    format!(
                        "global timeout of {}ms elapsed before analysis finished",
                        global_timeout.as_millis()
                    ),
                )
            } else {
                AnalysisResult::failed(
                    instrument.clone(),
                    FailureKind::InstrumentFailed,
                    "analysis task ended without a result",
                )
            };
            results.insert(instrument.clone(), result);
        }

        let outcome = FanOutOutcome { results, timed_out };
        tracing::info!(
            instruments = instruments.len(),
            successes = outcome.successes(),
            timed_out,
            "fan-out finished"
        );
        outcome
    }
}

fn collect(results: &mut BTreeMap<Instrument, AnalysisResult>, result: AnalysisResult) {
    if results.contains_key(&result.instrument) {
        tracing::warn!(instrument = %result.instrument, "duplicate analysis result ignored");
        return;
    }
    tracing::debug!(instrument = %result.instrument, status = ?result.status, "analysis collected");
    results.insert(result.instrument.clone(), result);
}

/// Closes the channel and keeps results that were already sent before the
/// deadline won the race.
fn drain_buffered(
    rx: &mut mpsc::Receiver<AnalysisResult>,
    results: &mut BTreeMap<Instrument, AnalysisResult>,
) {
    rx.close();
    while let Ok(result) = rx.try_recv() {
        collect(results, result);
    }
}
