/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Debug logging instead of info; RUST_LOG takes precedence
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scenarios of a config file, or the built-in profile if no file is given
    Run {
        /// Path to the config file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Only run the scenario with this name
        #[arg(short, long)]
        scenario: Option<String>,

        /// Base url of the target, overrides BASE_URL and the config file
        #[arg(long)]
        base_url: Option<String>,

        /// Print the summary as JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// Write an example config file
    Init {
        #[arg(short, long, default_value = "loadprobe.toml")]
        file: PathBuf,
    },

    /// Serve a mock of the products endpoint for local runs
    Mock {
        #[arg(short, long, default_value_t = 7001)]
        port: u16,

        /// Status code every response is answered with
        #[arg(long, default_value_t = 200)]
        status: u16,

        /// Artificial delay before each response, in milliseconds
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,
    },
}

pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_accepts_overrides() {
        let args = Args::parse_from([
            "loadprobe",
            "-v",
            "run",
            "--file",
            "loadprobe.toml",
            "--scenario",
            "low_load",
            "--base-url",
            "http://localhost:7001",
            "--json",
        ]);

        assert!(args.verbose);
        match args.command {
            Commands::Run {
                file,
                scenario,
                base_url,
                json,
            } => {
                assert_eq!(file, Some(PathBuf::from("loadprobe.toml")));
                assert_eq!(scenario.as_deref(), Some("low_load"));
                assert_eq!(base_url.as_deref(), Some("http://localhost:7001"));
                assert!(json);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn mock_defaults() {
        let args = Args::parse_from(["loadprobe", "mock"]);
        match args.command {
            Commands::Mock {
                port,
                status,
                delay_ms,
            } => assert_eq!((port, status, delay_ms), (7001, 200, 0)),
            _ => panic!("expected mock command"),
        }
    }
}
