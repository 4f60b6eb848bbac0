//! REST backend over reqwest.

use async_trait::async_trait;
use kako_core::auth::TokenProvider;
use kako_core::backend::{BackendApi, HttpMethod};
use kako_core::{KakoError, Result};
use reqwest::{Client, Method};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// [`BackendApi`] implementation that talks to the dashboard over HTTP,
/// attaching the current token as a bearer credential.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpBackend {
    pub fn new(
        server_url: &str,
        tokens: Arc<dyn TokenProvider>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = Url::parse(server_url)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KakoError::internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            tokens,
        })
    }

    fn method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn send_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value> {
        let url = self.base_url.join(path)?;
        tracing::debug!("[HttpBackend] {} {}", method, url.path());

        let mut request = self.client.request(Self::method(method), url);
        if let Some(token) = self.tokens.auth_token() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                KakoError::Timeout(format!("{} {}", method, path))
            } else {
                KakoError::transport(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| KakoError::transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| text.trim().to_string());
            return Err(KakoError::http(status.as_u16(), message));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}
