//! HTTP transport for deployments exposing a function API.
//!
//! This module requires the `http` feature flag.
//!
//! Calls are posted to `{url}/api/query` or `{url}/api/mutation` with the
//! body `{"path": <function>, "args": <object>, "format": "json"}`. The
//! response is an envelope, either `{"status": "success", "value": ...}` or
//! `{"status": "error", "errorMessage": ...}`.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::transport::Transport;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use shopify_sessions_log::trace;

#[derive(Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum FunctionResponse {
    Success {
        #[serde(default)]
        value: Value,
    },
    Error {
        #[serde(rename = "errorMessage")]
        error_message: String,
    },
}

/// Transport posting function calls over HTTP.
///
/// # Examples
///
/// ```ignore
/// use shopify_sessions_client::{ClientConfig, HttpTransport, SessionClient};
///
/// let config = ClientConfig::from_env()?;
/// let client = SessionClient::from_config(HttpTransport::new(&config)?, &config);
/// let sessions = client.find_sessions_by_shop("example.myshopify.com").await?;
/// ```
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    url: String,
    auth_token: Option<String>,
}

impl HttpTransport {
    /// Build a transport with the configured URL, token and timeout.
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            auth_token: config.auth_token.clone(),
        })
    }

    async fn call(&self, kind: &str, function: &str, args: Value) -> ClientResult<Value> {
        let url = format!("{}/api/{}", self.url, kind);
        let body = json!({
            "path": function,
            "args": args,
            "format": "json",
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        trace!("POST {} {}", url, function);
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        let envelope: FunctionResponse = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(ClientError::Transport(format!(
                    "{} {} returned {}: {}",
                    kind, function, status, text
                )));
            }
            Err(e) => {
                return Err(ClientError::Deserialization(format!(
                    "Unexpected response for {}: {}",
                    function, e
                )));
            }
        };

        match envelope {
            FunctionResponse::Success { value } => Ok(value),
            FunctionResponse::Error { error_message } => Err(ClientError::Remote {
                function: function.to_string(),
                message: error_message,
            }),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn query(&self, function: &str, args: Value) -> ClientResult<Value> {
        self.call("query", function, args).await
    }

    async fn mutation(&self, function: &str, args: Value) -> ClientResult<Value> {
        self.call("mutation", function, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(server: &MockServer) -> HttpTransport {
        let config = ClientConfig::new(&server.uri())
            .unwrap()
            .with_auth_token("deploy-key");
        HttpTransport::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_query_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/query"))
            .and(header("authorization", "Bearer deploy-key"))
            .and(body_json(json!({
                "path": "lib:loadSession",
                "args": { "id": "offline_a.myshopify.com" },
                "format": "json"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "value": { "id": "offline_a.myshopify.com", "shop": "a.myshopify.com", "isOnline": false },
                "logLines": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let value = transport(&server)
            .query("lib:loadSession", json!({ "id": "offline_a.myshopify.com" }))
            .await
            .unwrap();
        assert_eq!(value["shop"], "a.myshopify.com");
    }

    #[tokio::test]
    async fn test_mutation_null_value() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/mutation"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": "success", "value": null })),
            )
            .mount(&server)
            .await;

        let value = transport(&server)
            .mutation("lib:storeSession", json!({}))
            .await
            .unwrap();
        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn test_remote_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/mutation"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "status": "error",
                "errorMessage": "ArgumentValidationError: missing field shop"
            })))
            .mount(&server)
            .await;

        let result = transport(&server)
            .mutation("lib:storeSession", json!({ "id": "x" }))
            .await;
        match result {
            Err(ClientError::Remote { function, message }) => {
                assert_eq!(function, "lib:storeSession");
                assert!(message.contains("missing field shop"));
            }
            other => panic!("expected remote error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_envelope_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/query"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let result = transport(&server)
            .query("lib:loadSession", json!({ "id": "x" }))
            .await;
        assert!(matches!(result, Err(ClientError::Transport(_))));
    }

    #[tokio::test]
    async fn test_timeout_is_an_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/query"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": "success", "value": null }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let config = ClientConfig::new(&server.uri())
            .unwrap()
            .with_timeout(Duration::from_millis(50));
        let result = HttpTransport::new(&config)
            .unwrap()
            .query("lib:loadSession", json!({ "id": "x" }))
            .await;
        assert!(matches!(result, Err(ClientError::Http(e)) if e.is_timeout()));
    }
}
