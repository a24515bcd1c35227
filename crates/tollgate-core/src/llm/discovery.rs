use crate::constants::endpoints;
use crate::error::TollgateError;
use crate::llm::http;
use crate::llm::provider::{ProviderConfig, ProviderId};
use serde_json::Value;

/// Lists the models a vendor account can use.
pub struct ModelDiscovery;

impl ModelDiscovery {
    /// Query the vendor's model-list endpoint with the short metadata timeout.
    pub async fn list_models(
        config: &ProviderConfig,
        api_key: &str,
    ) -> Result<Vec<String>, TollgateError> {
        let client = http::metadata_client();
        let base = config.base_url.trim_end_matches('/');

        let request = match config.id {
            ProviderId::OpenAI => client
                .get(format!("{base}/v1/models"))
                .bearer_auth(api_key),
            ProviderId::Claude => client
                .get(format!("{base}/v1/models"))
                .header("x-api-key", api_key)
                .header("anthropic-version", endpoints::ANTHROPIC_VERSION),
            ProviderId::Gemini => client
                .get(format!("{base}/v1beta/models"))
                .header("x-goog-api-key", api_key),
        };

        let body = http::send_json(config.id, request).await?;
        let mut models = parse_model_list(config.id, &body);
        models.sort();
        Ok(models)
    }
}

fn parse_model_list(provider: ProviderId, body: &Value) -> Vec<String> {
    match provider {
        ProviderId::OpenAI | ProviderId::Claude => body
            .get("data")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|m| m.get("id").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        ProviderId::Gemini => body
            .get("models")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|m| m.get("name").and_then(Value::as_str))
                    .map(|name| name.trim_start_matches("models/").to_string())
                    .collect()
            })
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_openai_and_claude_lists() {
        let body = serde_json::json!({"data": [{"id": "gpt-4o"}, {"id": "gpt-4o-mini"}]});
        assert_eq!(
            parse_model_list(ProviderId::OpenAI, &body),
            vec!["gpt-4o", "gpt-4o-mini"]
        );
        assert_eq!(parse_model_list(ProviderId::Claude, &body).len(), 2);
    }

    #[test]
    fn strips_gemini_model_prefix() {
        let body = serde_json::json!({"models": [{"name": "models/gemini-2.5-flash"}]});
        assert_eq!(
            parse_model_list(ProviderId::Gemini, &body),
            vec!["gemini-2.5-flash"]
        );
        assert!(parse_model_list(ProviderId::Gemini, &serde_json::json!({})).is_empty());
    }
}
