// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use crate::config::{FETCH_TIMEOUT, USER_AGENT};
use crate::error::{AppError, Result};

/// Create the asynchronous HTTP client used for page retrieval.
pub fn create_async_client() -> Result<reqwest::Client> {
    create_client_with(USER_AGENT, FETCH_TIMEOUT)
}

/// Create a client with an explicit signature and timeout.
pub fn create_client_with(user_agent: &str, timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// GET `url` and return the body, mapping every failure to [`AppError::Fetch`].
pub async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::fetch(url, describe(&e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::fetch(url, format!("HTTP status {status}")));
    }

    response
        .text()
        .await
        .map_err(|e| AppError::fetch(url, describe(&e)))
}

fn describe(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("timed out: {error}")
    } else if error.is_connect() {
        format!("connection failed: {error}")
    } else {
        error.to_string()
    }
}
