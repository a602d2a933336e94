//! Shared reqwest plumbing for the HTTP-backed adapters.

use anyhow::Context;
use cloug_common::{ComputeError, Result};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

pub(crate) fn build_client(insecure: bool) -> anyhow::Result<Client> {
    Client::builder()
        .danger_accept_invalid_certs(insecure)
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")
}

pub(crate) fn transport_error(what: &str, err: reqwest::Error) -> ComputeError {
    ComputeError::transport(format!("{} failed: {}", what, err))
}

/// Turns a non-2xx response into an error carrying status and body verbatim.
///
/// 404 becomes `NotFound`; every other status is a provider error.
pub(crate) async fn check_status(what: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        return Err(ComputeError::not_found(format!("{} ({}): {}", what, status, body)));
    }
    Err(ComputeError::provider(
        Some(status.as_u16().to_string()),
        format!("{} failed: {}", what, body),
    ))
}

pub(crate) async fn decode_json<T: DeserializeOwned>(what: &str, response: Response) -> Result<T> {
    response
        .json()
        .await
        .map_err(|e| ComputeError::transport(format!("Failed to parse {} response: {}", what, e)))
}
