//! Script-error tester: uncaught exceptions and console errors.
//!
//! Handlers attach before navigation so errors thrown during page load are
//! not missed; a 500 ms settle afterwards catches async errors.

use super::{is_console_noise, navigate, truncate};
use crate::config;
use crate::defects::{Defect, DefectType, Severity};
use anyhow::Result;
use chromiumoxide::cdp::js_protocol::runtime::{
    ConsoleApiCalledType, EventConsoleApiCalled, EventExceptionThrown, RemoteObject,
};
use chromiumoxide::Page;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Mutex;

pub async fn run(page: &Page, url: &str) -> Result<Vec<Defect>> {
    let defects: Arc<Mutex<Vec<Defect>>> = Arc::new(Mutex::new(Vec::new()));

    let mut exceptions = page.event_listener::<EventExceptionThrown>().await?;
    let mut console_events = page.event_listener::<EventConsoleApiCalled>().await?;

    let sink = Arc::clone(&defects);
    let page_url = url.to_string();
    let exception_task = tokio::spawn(async move {
        while let Some(event) = exceptions.next().await {
            let details = &event.exception_details;
            let message = details
                .exception
                .as_ref()
                .and_then(|e| e.description.clone())
                .unwrap_or_else(|| details.text.clone());
            let first_line = message.lines().next().unwrap_or("").to_string();
            sink.lock().await.push(Defect::new(
                DefectType::ConsoleError,
                Severity::Critical,
                format!("Uncaught exception: {first_line}"),
                message,
                &page_url,
            ));
        }
    });

    let sink = Arc::clone(&defects);
    let page_url = url.to_string();
    let console_task = tokio::spawn(async move {
        while let Some(event) = console_events.next().await {
            if event.r#type != ConsoleApiCalledType::Error {
                continue;
            }
            let message = event
                .args
                .iter()
                .map(remote_object_text)
                .collect::<Vec<_>>()
                .join(" ");
            if message.is_empty() || is_console_noise(&message) {
                continue;
            }
            sink.lock().await.push(Defect::new(
                DefectType::ConsoleError,
                Severity::Warning,
                format!("Console error: {}", truncate(&message, 100)),
                message,
                &page_url,
            ));
        }
    });

    navigate(page, url).await?;
    tokio::time::sleep(config::SETTLE_LONG).await;

    exception_task.abort();
    console_task.abort();

    let found = defects.lock().await.clone();
    Ok(found)
}

fn remote_object_text(object: &RemoteObject) -> String {
    if let Some(value) = &object.value {
        return match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
    }
    object
        .description
        .clone()
        .unwrap_or_else(|| "undefined".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_object(raw: serde_json::Value) -> RemoteObject {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_remote_object_text_prefers_plain_strings() {
        let object = remote_object(serde_json::json!({"type": "string", "value": "boom"}));
        assert_eq!(remote_object_text(&object), "boom");

        let object = remote_object(serde_json::json!({"type": "number", "value": 42}));
        assert_eq!(remote_object_text(&object), "42");

        let object = remote_object(serde_json::json!({"type": "undefined"}));
        assert_eq!(remote_object_text(&object), "undefined");
    }
}
