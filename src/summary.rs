/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::{
    execution_plan::ExecutionPlan,
    metrics::{LatencyStats, MetricsLog},
};
use chrono::{DateTime, Utc};
use colored::*;
use serde::Serialize;
use std::time::Duration;
use term_table::{row, row::Row, rows, table_cell::*, Table, TableStyle};

#[derive(Debug, Clone, Serialize)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
    pub rate: Option<f64>,
}

/// Request latencies in milliseconds.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LatencySummary {
    pub min: f64,
    pub avg: f64,
    pub med: f64,
    pub p90: f64,
    pub p95: f64,
    pub max: f64,
}
impl From<LatencyStats> for LatencySummary {
    fn from(stats: LatencyStats) -> Self {
        let ms = |d: Duration| d.as_nanos() as f64 / 1_000_000.0;
        LatencySummary {
            min: ms(stats.min),
            avg: ms(stats.avg),
            med: ms(stats.med),
            p90: ms(stats.p90),
            p95: ms(stats.p95),
            max: ms(stats.max),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct WorkerSummary {
    pub pre_allocated: u32,
    pub max: u32,
    pub allocated: u32,
    pub max_in_use: u32,
}

/// End of run report for a single scenario.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub run_id: String,
    pub scenario: String,
    pub url: String,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub iterations: u64,
    pub dropped_iterations: u64,
    pub interrupted_iterations: u64,
    pub http_reqs: u64,
    pub http_req_failed: u64,
    pub checks: Vec<CheckSummary>,
    pub checks_rate: Option<f64>,
    pub latency_ms: Option<LatencySummary>,
    pub workers: WorkerSummary,
    pub thresholds_ok: bool,
}

impl Summary {
    pub fn new(
        run_id: &str,
        plan: &ExecutionPlan,
        metrics_log: &MetricsLog,
        workers: WorkerSummary,
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        let checks = metrics_log
            .check_tallies()
            .iter()
            .map(|(check, tally)| CheckSummary {
                name: check.name.clone(),
                passes: tally.passes,
                fails: tally.fails,
                rate: tally.rate(),
            })
            .collect();

        let checks_rate = metrics_log.checks_total().rate();

        // a threshold over checks that never ran is breached
        let thresholds_ok = match plan.thresholds.checks_min_rate {
            None => true,
            Some(min_rate) => checks_rate.is_some_and(|rate| rate >= min_rate),
        };

        Summary {
            run_id: run_id.to_string(),
            scenario: plan.scenario_name.clone(),
            url: plan.url.to_string(),
            started_at,
            duration_secs: elapsed.as_secs_f64(),
            iterations: metrics_log.iterations(),
            dropped_iterations: metrics_log.dropped_iterations(),
            interrupted_iterations: metrics_log.interrupted_iterations(),
            http_reqs: metrics_log.http_reqs(),
            http_req_failed: metrics_log.http_req_failed(),
            checks,
            checks_rate,
            latency_ms: metrics_log.latency_stats().map(LatencySummary::from),
            workers,
            thresholds_ok,
        }
    }

    /// Requests per second over the whole run.
    pub fn http_req_rate(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.http_reqs as f64 / self.duration_secs
        } else {
            0.0
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str(&format!(
            "{} {} ({}) - {}\n",
            "scenario".bold(),
            self.scenario.green(),
            self.run_id,
            self.url
        ));

        let checks_table = Table::builder()
            .rows(
                std::iter::once(row![
                    TableCell::builder("Check".bold()).build(),
                    TableCell::builder("Passes".bold()).build(),
                    TableCell::builder("Fails".bold()).build(),
                    TableCell::builder("Rate".bold()).build()
                ])
                .chain(self.checks.iter().map(|check| {
                    row![
                        TableCell::new(&check.name),
                        TableCell::new(check.passes),
                        TableCell::new(check.fails),
                        TableCell::new(rate_str(check.rate))
                    ]
                }))
                .collect(),
            )
            .style(TableStyle::rounded())
            .build();
        out.push_str(&checks_table.render());
        out.push('\n');

        let latency = |f: fn(&LatencySummary) -> f64| {
            self.latency_ms
                .as_ref()
                .map(|l| format!("{:.2}ms", f(l)))
                .unwrap_or("--".to_string())
        };

        let metrics_table = Table::builder()
            .rows(rows![
                row![
                    TableCell::builder("Duration (s)".bold()).build(),
                    TableCell::builder("Iterations".bold()).build(),
                    TableCell::builder("Dropped".bold()).build(),
                    TableCell::builder("Interrupted".bold()).build(),
                    TableCell::builder("Reqs/s".bold()).build(),
                    TableCell::builder("Failed reqs".bold()).build(),
                    TableCell::builder("Workers (max used)".bold()).build()
                ],
                row![
                    TableCell::new(format!("{:.3}s", self.duration_secs)),
                    TableCell::new(self.iterations),
                    TableCell::new(self.dropped_iterations),
                    TableCell::new(self.interrupted_iterations),
                    TableCell::new(format!("{:.2}", self.http_req_rate())),
                    TableCell::new(self.http_req_failed),
                    TableCell::new(format!(
                        "{}/{}",
                        self.workers.max_in_use, self.workers.max
                    ))
                ],
                row![
                    TableCell::builder("Latency min".bold()).build(),
                    TableCell::builder("avg".bold()).build(),
                    TableCell::builder("med".bold()).build(),
                    TableCell::builder("p(90)".bold()).build(),
                    TableCell::builder("p(95)".bold()).build(),
                    TableCell::builder("max".bold()).build(),
                    TableCell::new("")
                ],
                row![
                    TableCell::new(latency(|l| l.min)),
                    TableCell::new(latency(|l| l.avg)),
                    TableCell::new(latency(|l| l.med)),
                    TableCell::new(latency(|l| l.p90)),
                    TableCell::new(latency(|l| l.p95)),
                    TableCell::new(latency(|l| l.max)),
                    TableCell::new("")
                ]
            ])
            .style(TableStyle::rounded())
            .build();
        out.push_str(&metrics_table.render());
        out.push('\n');

        if !self.thresholds_ok {
            out.push_str(&format!(
                "{}\n",
                "thresholds breached: check pass rate below the configured minimum".red()
            ));
        }

        out
    }
}

/// Every summary as one pretty printed JSON array.
pub fn to_json(summaries: &[Summary]) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(summaries)?)
}

fn rate_str(rate: Option<f64>) -> ColoredString {
    match rate {
        None => "--".bright_black(),
        Some(rate) if rate >= 1.0 => format!("{:.2}%", rate * 100.0).green(),
        Some(rate) => format!("{:.2}%", rate * 100.0).red(),
    }
}
