/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

pub mod checks;
pub mod clap_args;
pub mod config;
pub mod execution_plan;
pub mod invocation;
pub mod metrics;
pub mod mock_server;
pub mod scenario_runner;
pub mod schedule;
pub mod summary;
pub mod worker_pool;

use execution_plan::ExecutionPlan;
use invocation::HttpInvoker;
use scenario_runner::StopSignal;
use std::sync::Arc;
use summary::Summary;
use tracing::warn;

/// Exit code used when a scenario's thresholds were breached.
pub const THRESHOLDS_BREACHED_EXIT_CODE: i32 = 99;

/// Runs every plan, one after the other, against its HTTP target.
///
/// # Arguments
/// * plans - the scenarios to run, in order
/// * stop - stops (or aborts) the running scenario and skips the remaining ones
///
/// # Returns
/// The summary of each scenario that was started.
pub async fn run(plans: &[ExecutionPlan], stop: StopSignal) -> anyhow::Result<Vec<Summary>> {
    let mut summaries = vec![];

    for plan in plans {
        if stop.is_stopped() {
            warn!("Skipping scenario {}: run was stopped", plan.scenario_name);
            continue;
        }

        let invoker = Arc::new(HttpInvoker::from_plan(plan)?);
        let summary = scenario_runner::run_scenario(plan, invoker, stop.clone()).await?;
        summaries.push(summary);
    }

    Ok(summaries)
}

/// The process exit code for a finished run: [`THRESHOLDS_BREACHED_EXIT_CODE`] if any scenario
/// breached its thresholds, 0 otherwise. Failed checks alone never fail the run.
pub fn exit_code(summaries: &[Summary]) -> i32 {
    if summaries.iter().any(|summary| !summary.thresholds_ok) {
        THRESHOLDS_BREACHED_EXIT_CODE
    } else {
        0
    }
}
