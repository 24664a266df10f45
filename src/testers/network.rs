//! Sub-resource tester: failed requests and error responses.
//!
//! Listens for every response and loading failure while the page loads.
//! Responses with status >= 400 on sub-resources become defects; requests
//! that never receive a response (DNS failure, connection reset) are
//! critical. Deliberately canceled requests are not failures.

use super::{is_request_noise, navigate, url_path};
use crate::config;
use crate::defects::{Defect, DefectType, Severity};
use anyhow::Result;
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventRequestWillBeSent, EventResponseReceived, RequestId,
};
use chromiumoxide::Page;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub async fn run(page: &Page, url: &str) -> Result<Vec<Defect>> {
    let defects: Arc<Mutex<Vec<Defect>>> = Arc::new(Mutex::new(Vec::new()));
    let requests: Arc<Mutex<HashMap<RequestId, (String, String)>>> =
        Arc::new(Mutex::new(HashMap::new()));

    let mut request_events = page.event_listener::<EventRequestWillBeSent>().await?;
    let mut response_events = page.event_listener::<EventResponseReceived>().await?;
    let mut failure_events = page.event_listener::<EventLoadingFailed>().await?;

    let seen = Arc::clone(&requests);
    let request_task = tokio::spawn(async move {
        while let Some(event) = request_events.next().await {
            seen.lock().await.insert(
                event.request_id.clone(),
                (event.request.method.clone(), event.request.url.clone()),
            );
        }
    });

    let sink = Arc::clone(&defects);
    let seen = Arc::clone(&requests);
    let page_url = url.to_string();
    let response_task = tokio::spawn(async move {
        while let Some(event) = response_events.next().await {
            let status = event.response.status;
            let resource_url = event.response.url.clone();
            // The page URL is normalized without a trailing slash; the
            // document response reports one. Compare modulo that.
            let is_page_itself =
                resource_url.trim_end_matches('/') == page_url.trim_end_matches('/');
            if status < 400 || is_page_itself || is_request_noise(&resource_url) {
                continue;
            }
            let method = seen
                .lock()
                .await
                .get(&event.request_id)
                .map(|(m, _)| m.clone())
                .unwrap_or_else(|| "GET".to_string());
            let (kind, severity) = if status >= 500 {
                ("Server error", Severity::Critical)
            } else {
                ("Client error", Severity::Warning)
            };
            sink.lock().await.push(Defect::new(
                DefectType::NetworkError,
                severity,
                format!("{kind} {status} on {}", url_path(&resource_url)),
                format!("{method} {resource_url} returned {status}"),
                &page_url,
            ));
        }
    });

    let sink = Arc::clone(&defects);
    let seen = Arc::clone(&requests);
    let page_url = url.to_string();
    let failure_task = tokio::spawn(async move {
        while let Some(event) = failure_events.next().await {
            if event.canceled == Some(true) {
                continue;
            }
            let Some((method, resource_url)) = seen.lock().await.get(&event.request_id).cloned()
            else {
                continue;
            };
            if is_request_noise(&resource_url) {
                continue;
            }
            let error_text = if event.error_text.trim().is_empty() {
                "unknown error".to_string()
            } else {
                event.error_text.clone()
            };
            sink.lock().await.push(Defect::new(
                DefectType::NetworkError,
                Severity::Critical,
                format!("Request failed: {}", url_path(&resource_url)),
                format!("{method} {resource_url} failed: {error_text}"),
                &page_url,
            ));
        }
    });

    navigate(page, url).await?;
    tokio::time::sleep(config::SETTLE_LONG).await;

    request_task.abort();
    response_task.abort();
    failure_task.abort();

    let found = defects.lock().await.clone();
    Ok(found)
}
