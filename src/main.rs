/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use anyhow::Context;
use colored::Colorize;
use http::StatusCode;
use loadprobe::{
    clap_args::{self, Commands},
    config::Config,
    execution_plan::{base_url_override, create_execution_plans},
    mock_server::{self, MockSettings},
    scenario_runner::StopSignal,
    summary,
};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, subscriber::set_global_default, warn, Subscriber};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // read .env before anything looks at the environment
    dotenvy::dotenv().ok();

    let args = clap_args::parse();

    let env_filter = if args.verbose { "debug" } else { "info" };
    init_subscriber(get_subscriber(env_filter.to_string()))?;

    match args.command {
        Commands::Run {
            file,
            scenario,
            base_url,
            json,
        } => {
            let config = match file {
                Some(path) => Config::try_from_path(&path)?,
                None => {
                    info!("No config file given, using the built-in profile");
                    Config::default_profile()
                }
            };

            let base_url = base_url_override(base_url, dotenvy::var("BASE_URL").ok());
            let plans = create_execution_plans(&config, scenario.as_deref(), base_url.as_deref())?;

            // first Ctrl-C stops gracefully, the second aborts in-flight requests
            let stop = StopSignal::new();
            let signal = stop.clone();
            tokio::spawn(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    if signal.escalate() {
                        warn!("Ctrl-C received again, aborting in-flight requests");
                        break;
                    }
                    info!("Ctrl-C received, stopping. Press Ctrl-C again to abort in-flight requests");
                }
            });

            let summaries = loadprobe::run(&plans, stop).await?;

            if json {
                println!("{}", summary::to_json(&summaries)?);
            } else {
                println!("\n{}", " Summary ".reversed().green());
                for summary in summaries.iter() {
                    println!("{}", summary.render());
                }
            }

            let code = loadprobe::exit_code(&summaries);
            if code != 0 {
                std::process::exit(code);
            }
        }

        Commands::Init { file } => {
            Config::write_example_to_file(&file)?;
            println!("{} {}", "Created".green(), file.display());
        }

        Commands::Mock {
            port,
            status,
            delay_ms,
        } => {
            let status = StatusCode::from_u16(status).context(format!("Invalid status {}", status))?;
            let listener = TcpListener::bind(("0.0.0.0", port))
                .await
                .context(format!("Unable to bind port {}", port))?;

            mock_server::serve(
                listener,
                MockSettings {
                    status,
                    delay: Duration::from_millis(delay_ms),
                },
            )
            .await?;
        }
    }

    Ok(())
}

fn get_subscriber(env_filter: String) -> impl Subscriber + Sync + Send {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(env_filter));

    // stdout is reserved for the summary
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish()
}

fn init_subscriber(subscriber: impl Subscriber + Sync + Send + 'static) -> anyhow::Result<()> {
    set_global_default(subscriber).context("Failed to set subscriber")
}
