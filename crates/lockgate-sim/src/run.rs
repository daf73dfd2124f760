use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lockgate::{LockCoordinator, LockOutcome, LockRequest};
use serde::Serialize;
use tokio::sync::Barrier;
use tracing::{debug, warn};

/// What a simulation run observed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub backend: &'static str,
    pub request: String,
    pub workers: usize,
    pub acquired: usize,
    pub not_acquired: usize,
    pub failed: usize,
    /// Most workers seen inside the protected operation at once.
    pub peak_concurrency: usize,
    pub elapsed_ms: u128,
}

#[derive(Debug, Default)]
struct Tally {
    acquired: usize,
    not_acquired: usize,
    failed: usize,
}

#[derive(Debug, Default)]
struct Occupancy {
    inside: AtomicUsize,
    peak: AtomicUsize,
}

impl Occupancy {
    fn enter(&self) {
        let now = self.inside.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.inside.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Start `workers` tasks together, each invoking `request` `rounds` times with
/// an operation that holds for `hold`.
///
/// Lock errors that retrying can never fix abort the run.
pub async fn run(
    coordinator: Arc<LockCoordinator>,
    request: LockRequest,
    workers: usize,
    rounds: usize,
    hold: Duration,
) -> anyhow::Result<Report> {
    let occupancy = Arc::new(Occupancy::default());
    let barrier = Arc::new(Barrier::new(workers));
    let started = Instant::now();

    let mut tasks = Vec::with_capacity(workers);
    for worker in 0..workers {
        let coordinator = Arc::clone(&coordinator);
        let request = request.clone();
        let occupancy = Arc::clone(&occupancy);
        let barrier = Arc::clone(&barrier);
        tasks.push(tokio::spawn(async move {
            barrier.wait().await;
            let mut tally = Tally::default();
            for round in 0..rounds {
                let outcome = coordinator
                    .invoke(&request, || async {
                        occupancy.enter();
                        tokio::time::sleep(hold).await;
                        occupancy.leave();
                        Ok::<_, std::convert::Infallible>(())
                    })
                    .await;
                match outcome {
                    Ok(LockOutcome::Acquired(())) => tally.acquired += 1,
                    Ok(LockOutcome::NotAcquired) => {
                        debug!("Worker {} round {}: not acquired", worker, round);
                        tally.not_acquired += 1;
                    }
                    Err(err) => match err.as_lock() {
                        Some(lock) if lock.is_programming_error() => {
                            anyhow::bail!("worker {worker}: {lock}");
                        }
                        _ => {
                            warn!("Worker {} round {} failed: {}", worker, round, err);
                            tally.failed += 1;
                        }
                    },
                }
            }
            Ok(tally)
        }));
    }

    let mut report = Report {
        backend: coordinator.backend_name(),
        request: request.to_string(),
        workers,
        ..Default::default()
    };
    for task in tasks {
        let tally = task.await??;
        report.acquired += tally.acquired;
        report.not_acquired += tally.not_acquired;
        report.failed += tally.failed;
    }
    report.peak_concurrency = occupancy.peak.load(Ordering::SeqCst);
    report.elapsed_ms = started.elapsed().as_millis();
    Ok(report)
}
