//! reqwest implementation of the [`Transport`] port.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use aki_protocol::{client_version, AkiError, ClientConfig, RawResponse, Transport, TransportError};

/// Carries protocol exchanges over HTTP(S).
///
/// Holds one pooled [`reqwest::Client`]; clones share the pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    api_url: String,
}

impl HttpTransport {
    /// Builds a transport for the API base URL of `config`.
    pub fn new(config: &ClientConfig) -> Result<Self, AkiError> {
        let http = reqwest::Client::builder()
            .user_agent(client_version())
            .build()
            .map_err(|e| AkiError::configuration(format!("cannot build HTTP client: {e}")))?;
        Ok(Self::with_client(http, config))
    }

    /// Uses an existing reqwest client, e.g. one with custom TLS or proxy settings.
    pub fn with_client(http: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            http,
            api_url: config.api_url(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    async fn read(response: reqwest::Response) -> Result<RawResponse, TransportError> {
        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport_error)?;
        Ok(RawResponse::new(status, text))
    }
}

fn transport_error(err: reqwest::Error) -> TransportError {
    TransportError::new(err.to_string())
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, path: &str, body: &Map<String, Value>) -> Result<RawResponse, TransportError> {
        let url = self.url(path);
        debug!(%url, "POST");
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        Self::read(response).await
    }

    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<RawResponse, TransportError> {
        let url = self.url(path);
        debug!(%url, "GET");
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;
        Self::read(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aki_protocol::EndpointName;

    #[test]
    fn test_urls_are_relative_to_api_base() {
        let config = ClientConfig::new(EndpointName::new("llama3_chat").unwrap())
            .with_api_server("https://example.test/");
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.api_url(), "https://example.test/api/");
        assert_eq!(
            transport.url("progress/llama3_chat"),
            "https://example.test/api/progress/llama3_chat"
        );
    }
}
