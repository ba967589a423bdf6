/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::{checks::Check, invocation::RequestOutcome};
use itertools::Itertools;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CheckTally {
    pub passes: u64,
    pub fails: u64,
}
impl CheckTally {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }

    /// Fraction of passing evaluations, `None` if the check was never evaluated.
    pub fn rate(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.passes as f64 / total as f64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStats {
    pub min: Duration,
    pub avg: Duration,
    pub med: Duration,
    pub p90: Duration,
    pub p95: Duration,
    pub max: Duration,
}
impl LatencyStats {
    pub fn from_samples(samples: &[Duration]) -> Option<LatencyStats> {
        if samples.is_empty() {
            return None;
        }

        let sorted = samples.iter().copied().sorted().collect_vec();
        let total: Duration = sorted.iter().sum();

        Some(LatencyStats {
            min: sorted[0],
            avg: total / sorted.len() as u32,
            med: percentile(&sorted, 0.5),
            p90: percentile(&sorted, 0.9),
            p95: percentile(&sorted, 0.95),
            max: sorted[sorted.len() - 1],
        })
    }
}

/// Linear interpolation between the closest ranks of a sorted, non-empty slice.
fn percentile(sorted: &[Duration], p: f64) -> Duration {
    let rank = p * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }

    let weight = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]).mul_f64(weight)
}

/// Aggregates everything observed during a single scenario run.
#[derive(Debug)]
pub struct MetricsLog {
    checks: Vec<(Check, CheckTally)>,
    latencies: Vec<Duration>,
    iterations: u64,
    http_req_failed: u64,
    dropped_iterations: u64,
    interrupted_iterations: u64,
}

impl MetricsLog {
    pub fn new(checks: &[Check]) -> Self {
        Self {
            checks: checks
                .iter()
                .map(|check| (check.clone(), CheckTally::default()))
                .collect(),
            latencies: vec![],
            iterations: 0,
            http_req_failed: 0,
            dropped_iterations: 0,
            interrupted_iterations: 0,
        }
    }

    /// Records a completed invocation and evaluates every check against it.
    pub fn record(&mut self, outcome: &RequestOutcome) {
        self.iterations += 1;
        self.latencies.push(outcome.latency);
        if outcome.is_http_failure() {
            self.http_req_failed += 1;
        }

        for (check, tally) in self.checks.iter_mut() {
            if check.passes(outcome) {
                tally.passes += 1;
            } else {
                tally.fails += 1;
                debug!(
                    "Check '{}' failed: status={:?} error={:?}",
                    check.name, outcome.status, outcome.error
                );
            }
        }
    }

    pub fn record_dropped(&mut self) {
        self.dropped_iterations += 1;
    }

    pub fn record_interrupted(&mut self, count: u64) {
        self.interrupted_iterations += count;
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Every completed iteration issues exactly one request.
    pub fn http_reqs(&self) -> u64 {
        self.iterations
    }

    pub fn http_req_failed(&self) -> u64 {
        self.http_req_failed
    }

    pub fn dropped_iterations(&self) -> u64 {
        self.dropped_iterations
    }

    pub fn interrupted_iterations(&self) -> u64 {
        self.interrupted_iterations
    }

    pub fn check_tallies(&self) -> &[(Check, CheckTally)] {
        &self.checks
    }

    /// Passes and fails summed over every check.
    pub fn checks_total(&self) -> CheckTally {
        self.checks
            .iter()
            .fold(CheckTally::default(), |acc, (_, tally)| CheckTally {
                passes: acc.passes + tally.passes,
                fails: acc.fails + tally.fails,
            })
    }

    pub fn latency_stats(&self) -> Option<LatencyStats> {
        LatencyStats::from_samples(&self.latencies)
    }
}
