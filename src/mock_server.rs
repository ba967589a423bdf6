/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::config::DEFAULT_PATH;
use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use http::StatusCode;
use serde_json::{json, Value};
use std::{net::SocketAddr, time::Duration};
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::info;

/// Behaviour of the mock products endpoint.
#[derive(Debug, Clone, Copy)]
pub struct MockSettings {
    pub status: StatusCode,
    pub delay: Duration,
}
impl Default for MockSettings {
    fn default() -> Self {
        MockSettings {
            status: StatusCode::OK,
            delay: Duration::ZERO,
        }
    }
}

async fn list_products(State(settings): State<MockSettings>) -> (StatusCode, Json<Value>) {
    if !settings.delay.is_zero() {
        tokio::time::sleep(settings.delay).await;
    }

    let body = if settings.status.is_success() {
        json!({
            "success": true,
            "message": "Products retrieved",
            "data": [
                {
                    "id": "6f1c2f4e-8a5b-4c1e-9d7a-3b2e1f0a9c11",
                    "name": "Alambre recocido",
                    "description": "Alambre recocido calibre 16",
                    "category": "alambres",
                    "price": 52.5,
                    "sku": "ALR-16"
                },
                {
                    "id": "0b7d9e3a-2c4f-4a6b-8e1d-5f3a7c9b2d40",
                    "name": "Clavo estandar",
                    "description": "Clavo estandar 2 1/2 pulgadas",
                    "category": "clavos",
                    "price": 38.0,
                    "sku": "CLE-250"
                }
            ],
            "timestamp": Utc::now(),
            "path": DEFAULT_PATH,
            "status": settings.status.as_u16(),
        })
    } else {
        json!({
            "success": false,
            "message": settings.status.canonical_reason().unwrap_or("error"),
            "timestamp": Utc::now(),
            "path": DEFAULT_PATH,
            "status": settings.status.as_u16(),
        })
    };

    (settings.status, Json(body))
}

// Keep separate so tests can serve it on an ephemeral port
pub fn create_app(settings: MockSettings) -> Router {
    Router::new()
        .route(DEFAULT_PATH, get(list_products))
        .with_state(settings)
}

pub async fn serve(listener: TcpListener, settings: MockSettings) -> anyhow::Result<()> {
    info!(
        "Mock products endpoint listening on http://{}{} (status {}, delay {:?})",
        listener.local_addr()?,
        DEFAULT_PATH,
        settings.status,
        settings.delay
    );
    axum::serve(listener, create_app(settings)).await?;
    Ok(())
}

/// Starts the mock endpoint on a random local port in the background.
pub async fn spawn(settings: MockSettings) -> anyhow::Result<(SocketAddr, JoinHandle<anyhow::Result<()>>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(serve(listener, settings));
    Ok((addr, handle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_configured_status() -> anyhow::Result<()> {
        let (addr, handle) = spawn(MockSettings {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            delay: Duration::ZERO,
        })
        .await?;

        let resp = reqwest::get(format!("http://{}{}", addr, DEFAULT_PATH)).await?;
        assert_eq!(resp.status().as_u16(), 500);

        handle.abort();
        Ok(())
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() -> anyhow::Result<()> {
        let (addr, handle) = spawn(MockSettings::default()).await?;

        let resp = reqwest::get(format!("http://{}/deacero/api/v1/stores", addr)).await?;
        assert_eq!(resp.status().as_u16(), 404);

        let resp = reqwest::get(format!("http://{}{}", addr, DEFAULT_PATH)).await?;
        assert_eq!(resp.status().as_u16(), 200);
        let body: Value = resp.json().await?;
        assert_eq!(body["success"], true);

        handle.abort();
        Ok(())
    }
}
