//! reqwest-backed [`UpstreamClient`] for the courier search API.

use super::{RequestOptions, UpstreamClient, UpstreamResponse};
use crate::core::config::UpstreamConfig;
use crate::core::error::{GatewayError, GatewayResult, UpstreamError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

pub struct HttpUpstreamClient {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
}

impl HttpUpstreamClient {
    pub fn new(config: &UpstreamConfig) -> GatewayResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            GatewayError::config(format!("Invalid upstream base_url '{}': {}", config.base_url, e))
        })?;

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| GatewayError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_token: config.api_token.clone().filter(|t| !t.is_empty()),
        })
    }

    /// `path` is appended to the base URL, keeping any base path prefix
    fn endpoint(&self, path: &str) -> Result<Url, UpstreamError> {
        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| UpstreamError::Network(format!("invalid upstream url: {e}")))
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    async fn authenticated_request(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let url = self.endpoint(path)?;
        debug!(method = %options.method, url = %url, "Calling courier upstream");

        let mut request = self.client.request(options.method, url);
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if let Some(body) = &options.body {
            request = request.json(body);
        }
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str::<Value>(&text) {
                Ok(value) => value,
                Err(e) if status.is_success() => return Err(UpstreamError::Decode(e.to_string())),
                Err(_) => Value::String(text),
            }
        };

        if !status.is_success() {
            warn!(status = status.as_u16(), "Courier upstream returned non-success status");
        }

        Ok(UpstreamResponse {
            ok: status.is_success(),
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> HttpUpstreamClient {
        HttpUpstreamClient::new(&UpstreamConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = client("https://api.courier.example/v2/");
        assert_eq!(
            client.endpoint("/points/map").unwrap().as_str(),
            "https://api.courier.example/v2/points/map"
        );
    }

    #[test]
    fn test_invalid_base_url_is_a_config_error() {
        let result = HttpUpstreamClient::new(&UpstreamConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(GatewayError::Configuration { .. })));
    }

    #[test]
    fn test_blank_token_is_ignored() {
        let client = HttpUpstreamClient::new(&UpstreamConfig {
            api_token: Some(String::new()),
            ..Default::default()
        })
        .unwrap();
        assert!(client.api_token.is_none());
    }
}
