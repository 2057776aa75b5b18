//! Shared HTTP plumbing for the adapters.
//!
//! Every adapter sends a JSON body and reads a JSON body back; the mapping of
//! transport outcomes onto [`BackendError`] lives here so all of them report
//! failures the same way.

use std::collections::BTreeMap;
use std::time::Duration;

use parley_core::BackendError;
use serde::de::DeserializeOwned;
use tracing::warn;

/// Build the HTTP client shared by one adapter. Every request, including
/// model listing, gives up after `timeout`.
pub(crate) fn client(timeout: Duration) -> Result<reqwest::Client, BackendError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| BackendError::Network(format!("failed to create HTTP client: {e}")))
}

/// Send a request and decode a successful JSON response.
pub(crate) async fn send_json<T: DeserializeOwned>(
    backend: &str,
    request: reqwest::RequestBuilder,
) -> Result<T, BackendError> {
    let response = request.send().await.map_err(transport_error)?;

    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;

    if !status.is_success() {
        warn!(backend, status = status.as_u16(), body = %body, "Backend returned error");
        return Err(BackendError::Http {
            status_code: status.as_u16(),
            message: body,
        });
    }

    serde_json::from_str(&body)
        .map_err(|e| BackendError::Decode(format!("{backend}: {e}")))
}

/// Fetch a JSON document, or `None` on any failure.
pub(crate) async fn fetch_json(
    backend: &str,
    request: reqwest::RequestBuilder,
) -> Option<serde_json::Value> {
    match send_json(backend, request).await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(backend, error = %e, "Failed to list models");
            None
        }
    }
}

fn transport_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout(e.to_string())
    } else {
        BackendError::Network(e.to_string())
    }
}

/// Merge provider-specific fields into a request body. Fields the adapter
/// already set win.
pub(crate) fn merge_extra(body: &mut serde_json::Value, extra: &BTreeMap<String, serde_json::Value>) {
    if let Some(map) = body.as_object_mut() {
        for (key, value) in extra {
            map.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
}
