/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::{
    execution_plan::ExecutionPlan,
    invocation::{Invoker, RequestOutcome},
    metrics::MetricsLog,
    schedule::ArrivalSchedule,
    summary::{Summary, WorkerSummary},
    worker_pool::WorkerPool,
};
use anyhow::Context;
use chrono::Utc;
use nanoid::nanoid;
use std::sync::Arc;
use tokio::{
    sync::mpsc::{self, Receiver},
    task::JoinSet,
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Stops a run in two steps. The first [`StopSignal::escalate`] stops starting iterations and lets
/// the ones in flight finish within the graceful stop. The second aborts them right away.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stop: CancellationToken,
    abort: CancellationToken,
}
impl StopSignal {
    pub fn new() -> Self {
        StopSignal::default()
    }

    /// No more iterations are started, in-flight ones get the graceful stop.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// In-flight iterations are aborted without waiting for the graceful stop.
    pub fn abort(&self) {
        self.stop.cancel();
        self.abort.cancel();
    }

    /// Stops on the first call and aborts on every later one. Returns true once aborted.
    pub fn escalate(&self) -> bool {
        if self.is_stopped() {
            self.abort();
            true
        } else {
            self.stop();
            false
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    async fn stopped(&self) {
        self.stop.cancelled().await
    }

    async fn aborted(&self) {
        self.abort.cancelled().await
    }
}

enum IterationEvent {
    Completed(RequestOutcome),
    Dropped,
}

async fn aggregate(mut metrics_log: MetricsLog, mut rx: Receiver<IterationEvent>) -> MetricsLog {
    while let Some(event) = rx.recv().await {
        match event {
            IterationEvent::Completed(outcome) => metrics_log.record(&outcome),
            IterationEvent::Dropped => metrics_log.record_dropped(),
        }
    }
    metrics_log
}

enum Drain {
    Finished,
    GracefulStopElapsed,
    Aborted,
}

/// Runs a single scenario to completion and returns its summary.
///
/// One iteration is started per scheduled tick, independent of how long earlier iterations take.
/// Ticks that find every worker busy are dropped. Once the scenario's duration has elapsed (or
/// `stop` fires) no more iterations are started and the ones in flight get `graceful_stop` to
/// finish before they are aborted. Aborting through `stop` skips the wait.
///
/// Failed requests never fail the run, they only fail the checks of their own iteration.
pub async fn run_scenario(
    plan: &ExecutionPlan,
    invoker: Arc<dyn Invoker>,
    stop: StopSignal,
) -> anyhow::Result<Summary> {
    let run = &plan.run;
    let run_id = nanoid!(5, &nanoid::alphabet::SAFE);
    let started_at = Utc::now();
    let start = Instant::now();

    let pool = WorkerPool::new(run.min_workers, run.max_workers);
    let mut schedule = ArrivalSchedule::new(run.arrival_rate, run.rate_unit, run.total_duration);

    info!(
        "Starting scenario {} ({}): {} iterations per {:?} for {:?} against {}",
        plan.scenario_name,
        run_id,
        run.arrival_rate,
        run.rate_unit,
        run.total_duration,
        plan.url
    );

    let (tx, rx) = mpsc::channel(run.max_workers.max(1) as usize * 8);
    let aggregator = tokio::spawn(aggregate(MetricsLog::new(&plan.checks), rx));

    let mut join_set = JoinSet::new();

    // ---- start iterations ----
    loop {
        let tick = tokio::select! {
            biased;

            _ = stop.stopped() => {
                warn!("Scenario {} stopped, no more iterations will be started", plan.scenario_name);
                break;
            }
            tick = schedule.next_tick() => match tick {
                Some(tick) => tick,
                None => break,
            },
        };

        // reap finished iterations
        while join_set.try_join_next().is_some() {}

        match pool.try_lease() {
            Some(lease) => {
                let invoker = invoker.clone();
                let tx = tx.clone();

                join_set.spawn(async move {
                    let outcome = invoker.invoke().await;
                    debug!("Iteration {} on worker {} got {:?}", tick, lease.id(), outcome.status);
                    drop(lease);

                    if tx.send(IterationEvent::Completed(outcome)).await.is_err() {
                        debug!("Metrics aggregator stopped before iteration {} reported", tick);
                    }
                });
            }

            None => {
                debug!(
                    "Iteration {} dropped, {} of {} workers busy",
                    tick,
                    pool.in_use(),
                    run.max_workers
                );
                if tx.send(IterationEvent::Dropped).await.is_err() {
                    debug!("Metrics aggregator stopped before iteration {} reported", tick);
                }
            }
        }
    }
    // ---- end ----

    // the aggregator finishes once every in-flight iteration has dropped its sender
    drop(tx);

    let in_flight = join_set.len();
    if in_flight > 0 {
        debug!(
            "Waiting up to {:?} for {} in-flight iterations",
            run.graceful_stop, in_flight
        );
    }

    let drain = tokio::select! {
        biased;

        _ = stop.aborted() => Drain::Aborted,
        drained = tokio::time::timeout(run.graceful_stop, async {
            while join_set.join_next().await.is_some() {}
        }) => match drained {
            Ok(()) => Drain::Finished,
            Err(_) => Drain::GracefulStopElapsed,
        },
    };

    match drain {
        Drain::Finished => {}
        Drain::GracefulStopElapsed => warn!(
            "{} iterations did not finish within the graceful stop of {:?}, aborting them",
            join_set.len(),
            run.graceful_stop
        ),
        Drain::Aborted => warn!("Aborting {} in-flight iterations", join_set.len()),
    }

    // only iterations that were still running when aborted count as interrupted, the ones that
    // finished in the meantime have already reported
    join_set.abort_all();
    let mut interrupted = 0;
    while let Some(res) = join_set.join_next().await {
        if matches!(res, Err(err) if err.is_cancelled()) {
            interrupted += 1;
        }
    }

    let mut metrics_log = aggregator
        .await
        .context("Metrics aggregator task failed")?;
    metrics_log.record_interrupted(interrupted);

    let elapsed = start.elapsed();
    let workers = WorkerSummary {
        pre_allocated: run.min_workers.min(run.max_workers),
        max: run.max_workers,
        allocated: pool.allocated(),
        max_in_use: pool.max_in_use(),
    };

    info!(
        "Finished scenario {} ({}) in {:?}: {} iterations, {} dropped, {} interrupted",
        plan.scenario_name,
        run_id,
        elapsed,
        metrics_log.iterations(),
        metrics_log.dropped_iterations(),
        interrupted
    );

    Ok(Summary::new(
        &run_id,
        plan,
        &metrics_log,
        workers,
        started_at,
        elapsed,
    ))
}
