use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{snippet, Result};

pub(crate) fn build_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .unwrap_or_else(|err| {
            warn!(error = %err, "Failed to build HTTP client, using defaults without timeouts");
            Client::new()
        })
}

/// Send a request and decode the JSON body, logging the error body on failure.
pub(crate) async fn send_json<T: DeserializeOwned>(provider: &str, request: RequestBuilder) -> Result<T> {
    let response = request.send().await?;
    if let Err(err) = response.error_for_status_ref() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        warn!(provider, %status, body = %snippet(&body), "Provider request failed");
        return Err(err.into());
    }
    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FoundryError;

    #[tokio::test]
    async fn test_unreachable_host_is_http_error() {
        let client = build_client(2);
        let result: Result<serde_json::Value> = send_json("test", client.get("http://127.0.0.1:1/api/tags")).await;
        assert!(matches!(result, Err(FoundryError::Http(_))));
    }
}
