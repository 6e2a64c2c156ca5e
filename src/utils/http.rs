use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::warn;

use crate::providers::{truncate_for_log, ProviderError};

const ERROR_BODY_LOG_LIMIT: usize = 800;

/// `None` leaves requests unbounded; slow generation backends can take
/// minutes to answer.
pub fn build_http_client(timeout: Option<Duration>) -> reqwest::Result<Client> {
    let mut builder = Client::builder().pool_max_idle_per_host(32);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build()
}

/// Sends the request and parses a JSON body, mapping every failure to a
/// transient provider error.
pub async fn send_for_json(request: RequestBuilder, label: &str) -> Result<Value, ProviderError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        warn!(
            "{label} returned status {}: {}",
            status,
            truncate_for_log(&body, ERROR_BODY_LOG_LIMIT)
        );
        return Err(ProviderError::transient(format!("{label} returned {status}")));
    }

    serde_json::from_str::<Value>(&body).map_err(|err| {
        warn!(
            "{label} returned malformed JSON: {err}; body={}",
            truncate_for_log(&body, ERROR_BODY_LOG_LIMIT)
        );
        ProviderError::transient(format!("{label} returned malformed JSON: {err}"))
    })
}
