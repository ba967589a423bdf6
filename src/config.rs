/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::checks::{default_checks, Check};
use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{Read, Write},
    path::Path,
    time::Duration,
};

static EXAMPLE_CONFIG: &str = include_str!("templates/loadprobe.toml");

pub const DEFAULT_BASE_URL: &str = "https://deacero-inventario-api-368147415867.us-central1.run.app";
pub const DEFAULT_PATH: &str = "/deacero/api/v1/products";

// ******** ******** ********
// **    CONFIGURATION     **
// ******** ******** ********
#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(rename(serialize = "scenario", deserialize = "scenario"))]
    pub scenarios: Vec<Scenario>,
}
impl Config {
    /// The profile used when no configuration file is given: 10 GETs per second against the
    /// products endpoint for 30 seconds, with 5 pre-allocated workers and at most 20.
    pub fn default_profile() -> Config {
        Config {
            scenarios: vec![Scenario::default()],
        }
    }

    pub fn write_example_to_file(path: &Path) -> anyhow::Result<File> {
        let mut file = File::create_new(path)
            .context(format!("Unable to create config file {}", path.display()))?;
        File::write_all(&mut file, EXAMPLE_CONFIG.as_bytes())?;
        Ok(file)
    }

    pub fn try_from_path(path: &Path) -> anyhow::Result<Config> {
        let mut config_str = String::new();
        fs::File::open(path)
            .context(format!("Unable to open config file {}", path.display()))?
            .read_to_string(&mut config_str)?;
        Config::try_from_str(&config_str)
    }

    pub fn try_from_str(conf_str: &str) -> anyhow::Result<Config> {
        let config = toml::from_str::<Config>(conf_str)
            .map_err(|e| anyhow!("TOML parsing error: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scenarios.is_empty() {
            bail!("Config must define at least one [[scenario]]");
        }
        for scenario in self.scenarios.iter() {
            scenario
                .validate()
                .context(format!("Invalid scenario {}", scenario.name))?;
        }
        Ok(())
    }

    pub fn find_scenario(&self, scenario_name: &str) -> anyhow::Result<&Scenario> {
        self.scenarios
            .iter()
            .find(|scenario| scenario.name == scenario_name)
            .context(format!(
                "Unable to find scenario with name {}",
                scenario_name
            ))
    }
}

#[derive(Debug, Default, Deserialize, PartialEq, Clone, Copy, Serialize)]
pub enum Executor {
    #[default]
    #[serde(rename = "constant-arrival-rate")]
    ConstantArrivalRate,
}

#[derive(Debug, Default, Deserialize, PartialEq, Clone, Copy, Serialize)]
pub enum Method {
    #[default]
    #[serde(rename = "GET")]
    Get,
}

#[derive(Debug, Deserialize, PartialEq, Clone, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    #[serde(default)]
    pub method: Method,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_path")]
    pub path: String,
}
impl Default for Request {
    fn default() -> Self {
        Request {
            method: Method::Get,
            base_url: default_base_url(),
            path: default_path(),
        }
    }
}

#[derive(Debug, Default, Deserialize, PartialEq, Clone, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Thresholds {
    /// Minimum fraction of passing checks (0.0 - 1.0) for the run to be considered successful.
    pub checks_min_rate: Option<f64>,
}

#[derive(Debug, Deserialize, PartialEq, Clone, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub executor: Executor,
    /// Number of iterations started per `time_unit`.
    pub rate: u32,
    #[serde(with = "human_duration", default = "default_time_unit")]
    pub time_unit: Duration,
    #[serde(with = "human_duration")]
    pub duration: Duration,
    pub pre_allocated_workers: u32,
    pub max_workers: u32,
    #[serde(with = "human_duration", default = "default_graceful_stop")]
    pub graceful_stop: Duration,
    #[serde(with = "human_duration", default = "default_request_timeout")]
    pub request_timeout: Duration,
    #[serde(default)]
    pub request: Request,
    #[serde(rename = "check", default = "default_checks")]
    pub checks: Vec<Check>,
    #[serde(default)]
    pub thresholds: Thresholds,
}
impl Default for Scenario {
    fn default() -> Self {
        Scenario {
            name: "low_load".to_string(),
            executor: Executor::ConstantArrivalRate,
            rate: 10,
            time_unit: default_time_unit(),
            duration: Duration::from_secs(30),
            pre_allocated_workers: 5,
            max_workers: 20,
            graceful_stop: default_graceful_stop(),
            request_timeout: default_request_timeout(),
            request: Request::default(),
            checks: default_checks(),
            thresholds: Thresholds::default(),
        }
    }
}
impl Scenario {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rate == 0 {
            bail!("rate must be positive");
        }
        if self.time_unit.is_zero() {
            bail!("time_unit must be positive");
        }
        if self.duration.is_zero() {
            bail!("duration must be positive");
        }
        if self.max_workers == 0 {
            bail!("max_workers must be positive");
        }
        if self.pre_allocated_workers > self.max_workers {
            bail!(
                "pre_allocated_workers ({}) must not exceed max_workers ({})",
                self.pre_allocated_workers,
                self.max_workers
            );
        }
        if self.checks.is_empty() {
            bail!("at least one [[scenario.check]] is required");
        }
        if let Some(rate) = self.thresholds.checks_min_rate {
            if !(0.0..=1.0).contains(&rate) {
                bail!("thresholds.checks_min_rate must be between 0.0 and 1.0, got {rate}");
            }
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_path() -> String {
    DEFAULT_PATH.to_string()
}

fn default_time_unit() -> Duration {
    Duration::from_secs(1)
}

fn default_graceful_stop() -> Duration {
    Duration::from_secs(30)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

/// (De)serializes durations written as human readable strings, e.g. "1s", "500ms" or "1m 30s".
mod human_duration {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_matches_low_load_scenario() {
        let cfg = Config::default_profile();
        let scenario = &cfg.scenarios[0];

        assert_eq!(scenario.rate, 10);
        assert_eq!(scenario.time_unit, Duration::from_secs(1));
        assert_eq!(scenario.duration, Duration::from_secs(30));
        assert_eq!(scenario.pre_allocated_workers, 5);
        assert_eq!(scenario.max_workers, 20);
        assert_eq!(scenario.request.path, "/deacero/api/v1/products");
        assert_eq!(scenario.checks, vec![Check::status(200)]);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn example_config_parses_to_default_profile() -> anyhow::Result<()> {
        let cfg = Config::try_from_str(EXAMPLE_CONFIG)?;
        assert_eq!(cfg, Config::default_profile());
        Ok(())
    }

    #[test]
    fn can_load_config_with_multiple_scenarios() -> anyhow::Result<()> {
        let cfg = Config::try_from_path(Path::new("./fixtures/loadprobe.multiple_scenarios.toml"))?;

        let names = cfg
            .scenarios
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, ["smoke", "spike"]);

        let spike = cfg.find_scenario("spike")?;
        assert_eq!(spike.rate, 50);
        assert_eq!(spike.time_unit, Duration::from_millis(500));
        assert_eq!(spike.graceful_stop, Duration::from_secs(5));
        assert_eq!(spike.request.base_url, "http://localhost:8080");
        assert_eq!(spike.thresholds.checks_min_rate, Some(0.95));

        assert!(cfg.find_scenario("soak").is_err());
        Ok(())
    }

    #[test]
    fn omitted_fields_fall_back_to_defaults() -> anyhow::Result<()> {
        let cfg = Config::try_from_str(
            r#"
            [[scenario]]
            name = "minimal"
            rate = 1
            duration = "2s"
            pre_allocated_workers = 1
            max_workers = 1
            "#,
        )?;

        let scenario = cfg.find_scenario("minimal")?;
        assert_eq!(scenario.time_unit, Duration::from_secs(1));
        assert_eq!(scenario.graceful_stop, Duration::from_secs(30));
        assert_eq!(scenario.request_timeout, Duration::from_secs(60));
        assert_eq!(scenario.request, Request::default());
        assert_eq!(scenario.checks[0].name, "status 200");
        Ok(())
    }

    #[test]
    fn pre_allocated_workers_must_not_exceed_max() {
        let scenario = Scenario {
            pre_allocated_workers: 21,
            ..Scenario::default()
        };
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn zero_rate_and_duration_are_rejected() {
        let zero_rate = Scenario {
            rate: 0,
            ..Scenario::default()
        };
        let zero_duration = Scenario {
            duration: Duration::ZERO,
            ..Scenario::default()
        };
        assert!(zero_rate.validate().is_err());
        assert!(zero_duration.validate().is_err());
    }

    #[test]
    fn unsupported_method_is_a_parse_error() {
        let res = Config::try_from_str(
            r#"
            [[scenario]]
            name = "post"
            rate = 1
            duration = "1s"
            pre_allocated_workers = 1
            max_workers = 1

            [scenario.request]
            method = "POST"
            "#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn misspelt_tables_are_rejected() {
        let base = r#"
            [[scenario]]
            name = "typo"
            rate = 1
            duration = "1s"
            pre_allocated_workers = 1
            max_workers = 1
            "#;

        for typo in [
            "[scenario.threshold]\nchecks_min_rate = 0.9",
            "[scenario.thresholds]\nchecks_min_rat = 0.9",
            "[[scenario.checks]]\nname = \"status 201\"\nstatus = 201",
            "[scenario.request]\nbase = \"http://localhost\"",
        ] {
            let res = Config::try_from_str(&format!("{}\n{}", base, typo));
            assert!(res.is_err(), "accepted {}", typo);
        }

        assert!(Config::try_from_str(base).is_ok());
    }

    #[test]
    fn empty_config_is_rejected() {
        assert!(Config::try_from_str("scenario = []").is_err());
    }
}
