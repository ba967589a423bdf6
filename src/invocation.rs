/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::execution_plan::ExecutionPlan;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// The result of a single invocation, consumed by the checks and then discarded.
#[derive(Debug, Clone, Serialize)]
pub struct RequestOutcome {
    /// `None` when no response was received (connect error, timeout, ...).
    pub status: Option<u16>,
    pub latency: Duration,
    pub error: Option<String>,
}
impl RequestOutcome {
    /// Responses outside 200-399 and transport failures.
    pub fn is_http_failure(&self) -> bool {
        !matches!(self.status, Some(status) if (200..400).contains(&status))
    }
}

/// Performs one invocation of the scenario's request.
///
/// Implementations must never retry and must never fail: every kind of failure is reported through
/// the returned outcome.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self) -> RequestOutcome;
}

pub struct HttpInvoker {
    client: Client,
    url: Url,
}
impl HttpInvoker {
    pub fn new(url: Url, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(HttpInvoker { client, url })
    }

    pub fn from_plan(plan: &ExecutionPlan) -> anyhow::Result<Self> {
        HttpInvoker::new(plan.url.clone(), plan.run.request_timeout)
    }
}

#[async_trait]
impl Invoker for HttpInvoker {
    async fn invoke(&self) -> RequestOutcome {
        let start = Instant::now();

        match self.client.get(self.url.clone()).send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();

                // drain the body so the connection can be reused, its contents are never inspected
                let error = resp.bytes().await.err().map(|err| {
                    debug!("Failed to read response body from {}: {}", self.url, err);
                    err.to_string()
                });

                RequestOutcome {
                    status: Some(status),
                    latency: start.elapsed(),
                    error,
                }
            }

            Err(err) => {
                debug!("Request to {} failed: {}", self.url, err);
                RequestOutcome {
                    status: None,
                    latency: start.elapsed(),
                    error: Some(err.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_failure_covers_error_statuses_and_transport_errors() {
        let outcome = |status| RequestOutcome {
            status,
            latency: Duration::ZERO,
            error: None,
        };

        assert!(!outcome(Some(200)).is_http_failure());
        assert!(!outcome(Some(304)).is_http_failure());
        assert!(outcome(Some(404)).is_http_failure());
        assert!(outcome(Some(500)).is_http_failure());
        assert!(outcome(None).is_http_failure());
    }

    #[tokio::test]
    async fn unreachable_target_yields_outcome_without_status() -> anyhow::Result<()> {
        // bind then drop a listener to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        drop(listener);

        let url = Url::parse(&format!("http://{}/deacero/api/v1/products", addr))?;
        let invoker = HttpInvoker::new(url, Duration::from_secs(5))?;

        let outcome = invoker.invoke().await;
        assert_eq!(outcome.status, None);
        assert!(outcome.error.is_some());
        Ok(())
    }
}
