/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::{
    checks::Check,
    config::{Config, Scenario, Thresholds},
};
use anyhow::Context;
use reqwest::Url;
use std::time::Duration;

/// The load profile of a single scenario. Built once and never mutated for the life of the run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfiguration {
    pub arrival_rate: u32,
    pub rate_unit: Duration,
    pub total_duration: Duration,
    pub min_workers: u32,
    pub max_workers: u32,
    pub graceful_stop: Duration,
    pub request_timeout: Duration,
}
impl From<&Scenario> for RunConfiguration {
    fn from(scenario: &Scenario) -> Self {
        RunConfiguration {
            arrival_rate: scenario.rate,
            rate_unit: scenario.time_unit,
            total_duration: scenario.duration,
            min_workers: scenario.pre_allocated_workers,
            max_workers: scenario.max_workers,
            graceful_stop: scenario.graceful_stop,
            request_timeout: scenario.request_timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub scenario_name: String,
    pub run: RunConfiguration,
    pub url: Url,
    pub checks: Vec<Check>,
    pub thresholds: Thresholds,
}

/// Joins the base url and the request path. The base url's trailing slashes are ignored so both
/// `http://host` and `http://host/` address the same endpoint.
pub fn target_url(base_url: &str, path: &str) -> anyhow::Result<Url> {
    let base_url = base_url.trim_end_matches('/');
    let url = if path.starts_with('/') {
        format!("{}{}", base_url, path)
    } else {
        format!("{}/{}", base_url, path)
    };

    Url::parse(&url).context(format!("Invalid target url {}", url))
}

/// Picks the base url that replaces every scenario's configured one: `--base-url` first, then the
/// `BASE_URL` environment variable. An empty value counts as unset.
pub fn base_url_override(cli: Option<String>, env: Option<String>) -> Option<String> {
    cli.into_iter()
        .chain(env)
        .find(|base_url| !base_url.trim().is_empty())
}

/// The base url a scenario is run against, the override if there is one.
pub fn resolve_base_url<'a>(base_url_override: Option<&'a str>, scenario: &'a Scenario) -> &'a str {
    base_url_override.unwrap_or(&scenario.request.base_url)
}

fn plan_scenario(scenario: &Scenario, base_url_override: Option<&str>) -> anyhow::Result<ExecutionPlan> {
    let base_url = resolve_base_url(base_url_override, scenario);

    Ok(ExecutionPlan {
        scenario_name: scenario.name.clone(),
        run: RunConfiguration::from(scenario),
        url: target_url(base_url, &scenario.request.path)?,
        checks: scenario.checks.clone(),
        thresholds: scenario.thresholds.clone(),
    })
}

/// Creates one execution plan per scenario to run, in the order they appear in the config.
///
/// # Arguments
/// * config - a validated configuration
/// * scenario_name - only plan the scenario with this name
/// * base_url_override - replaces the base url of every planned scenario
pub fn create_execution_plans(
    config: &Config,
    scenario_name: Option<&str>,
    base_url_override: Option<&str>,
) -> anyhow::Result<Vec<ExecutionPlan>> {
    match scenario_name {
        Some(name) => {
            let scenario = config.find_scenario(name)?;
            Ok(vec![plan_scenario(scenario, base_url_override)?])
        }

        None => config
            .scenarios
            .iter()
            .map(|scenario| plan_scenario(scenario, base_url_override))
            .collect(),
    }
}
