use crate::constants::limits;
use crate::error::TollgateError;
use crate::llm::ProviderId;
use serde_json::Value;
use std::time::Duration;

fn client_with_timeout(secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(secs))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        })
}

/// Client for generation and analysis calls.
pub(crate) fn generation_client() -> reqwest::Client {
    client_with_timeout(limits::GENERATION_TIMEOUT_SECS)
}

/// Client for model listing and other metadata calls.
pub(crate) fn metadata_client() -> reqwest::Client {
    client_with_timeout(limits::METADATA_TIMEOUT_SECS)
}

/// Send a request and decode a JSON body, mapping non-2xx to `Status`.
pub(crate) async fn send_json(
    provider: ProviderId,
    request: reqwest::RequestBuilder,
) -> Result<Value, TollgateError> {
    let response = request.send().await?;
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(TollgateError::Status {
            provider,
            status: status.as_u16(),
            body: vendor_message(&text),
        });
    }

    serde_json::from_str(&text)
        .map_err(|e| TollgateError::provider(provider, format!("Failed to parse response: {e}")))
}

/// Pull `error.message` out of a vendor error body, else return it trimmed.
fn vendor_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Read a token count at `pointer`, zero when absent.
pub(crate) fn token_count(body: &Value, pointer: &str) -> u64 {
    body.pointer(pointer).and_then(Value::as_u64).unwrap_or(0)
}
