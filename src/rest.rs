// Copyright 2026 Sitescan Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP surface for the scan engine.
//!
//! Thin collaborator over the scan registry: start a scan, stream its
//! progress as Server-Sent Events, fetch the finished report, and expose
//! the analytics file behind the admin key. Progress events are forwarded
//! verbatim as `{phase, message, progress}` JSON.

use crate::browser;
use crate::config;
use crate::scan::{ScanRegistry, StartScanError};
use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Build the axum Router with every endpoint.
pub fn router(registry: Arc<ScanRegistry>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/scan", post(start_scan))
        .route("/api/scan/{id}/events", get(scan_events))
        .route("/api/scan/{id}/report", get(scan_report))
        .route("/api/admin/analytics", get(admin_analytics))
        .layer(cors)
        .with_state(registry)
}

/// Serve the HTTP surface on 127.0.0.1:`port` until the process exits.
pub async fn serve(port: u16, registry: Arc<ScanRegistry>) -> Result<()> {
    let app = router(registry);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    info!("sitescan API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "chromium": browser::find_chromium().is_some(),
    }))
}

#[derive(Deserialize)]
struct StartScanBody {
    url: String,
}

async fn start_scan(
    State(registry): State<Arc<ScanRegistry>>,
    Json(body): Json<StartScanBody>,
) -> impl IntoResponse {
    match registry.start_scan(&body.url) {
        Ok(id) => (StatusCode::ACCEPTED, Json(json!({ "scanId": id }))),
        Err(e @ StartScanError::InvalidUrl(_)) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() })))
        }
        Err(e @ StartScanError::ScanInProgress) => {
            (StatusCode::CONFLICT, Json(json!({ "error": e.to_string() })))
        }
    }
}

/// Server-Sent Events stream of one scan's progress.
///
/// The subscription callback bridges into an unbounded channel; the stream
/// ends after the 100% event, and dropping it (client disconnect) detaches
/// the subscriber via the guard it holds.
async fn scan_events(
    Path(id): Path<String>,
    State(registry): State<Arc<ScanRegistry>>,
) -> Result<Sse<impl futures::Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let guard = registry
        .subscribe_progress(&id, move |event| {
            let _ = tx.send(event.clone());
        })
        .ok_or(StatusCode::NOT_FOUND)?;

    let stream = async_stream::stream! {
        let _guard = guard;
        while let Some(event) = rx.recv().await {
            let done = event.progress >= 100;
            if let Ok(data) = serde_json::to_string(&event) {
                yield Ok(Event::default().data(data));
            }
            if done {
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn scan_report(
    Path(id): Path<String>,
    State(registry): State<Arc<ScanRegistry>>,
) -> impl IntoResponse {
    match registry.get_report(&id) {
        Some(snapshot) => (StatusCode::OK, Json(serde_json::to_value(snapshot).unwrap_or_default())),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "unknown scan id" })),
        ),
    }
}

#[derive(Deserialize, Default)]
struct AdminParams {
    key: Option<String>,
}

/// Raw analytics records for the admin view. Requires the admin key env var
/// to be set and matched; without it the endpoint is closed.
async fn admin_analytics(
    Query(params): Query<AdminParams>,
    State(registry): State<Arc<ScanRegistry>>,
) -> impl IntoResponse {
    let expected = std::env::var(config::ADMIN_KEY_ENV).unwrap_or_default();
    if expected.is_empty() || params.key.as_deref() != Some(expected.as_str()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid admin key" })),
        );
    }
    let records = registry.analytics().read_all();
    (StatusCode::OK, Json(json!({ "scans": records })))
}
