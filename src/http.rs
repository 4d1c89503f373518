//! Transport to the Statwolf dashboard.
//!
//! Everything the client does over the network goes through [`Transport`], a
//! two-method post/get contract returning the decoded JSON reply. Dashboard
//! services wrap their payload in a `{ "Data": ... }` envelope; [`data`]
//! unwraps it.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use crate::config::{ClientConfig, Endpoint};
use crate::error::{StatwolfError, StatwolfResult};

pub const AUTH_HEADER: &str = "statwolf-auth";

/// The post/get collaborator used by every service
#[async_trait]
pub trait Transport: Send + Sync {
    /// POSTs a JSON body to `path` and returns the decoded reply
    async fn post(&self, path: &str, body: &Value) -> StatwolfResult<Value>;

    /// GETs `path` and returns the decoded reply
    async fn get(&self, path: &str) -> StatwolfResult<Value>;
}

/// Extracts the `Data` member of a reply envelope. A `false` payload is the
/// server's rejection sentinel and becomes an error.
pub fn data(reply: Value) -> StatwolfResult<Value> {
    match reply {
        Value::Object(mut map) => match map.remove("Data") {
            Some(Value::Bool(false)) => Err(StatwolfError::authentication_or_request()),
            Some(payload) => Ok(payload),
            None => Err(StatwolfError::UnexpectedResponse(
                "reply has no Data member".to_string(),
            )),
        },
        other => Err(StatwolfError::UnexpectedResponse(format!(
            "expected an object envelope, got {}",
            other
        ))),
    }
}

/// reqwest-backed transport authenticating with the `statwolf-auth` header
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    origin: String,
    auth: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> StatwolfResult<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("statwolf-rs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StatwolfError::Network(format!("Failed to build HTTP client: {}", e)))?;

        let Endpoint { origin, .. } = config.endpoint();

        Ok(Self {
            client,
            origin,
            auth: config.auth_header(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.origin, path)
    }

    async fn send(&self, request: RequestBuilder) -> StatwolfResult<Value> {
        let response = request.header(AUTH_HEADER, &self.auth).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StatwolfError::Http {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, path: &str, body: &Value) -> StatwolfResult<Value> {
        debug!("POST {}", path);
        self.send(self.client.post(self.url(path)).json(body)).await
    }

    async fn get(&self, path: &str) -> StatwolfResult<Value> {
        debug!("GET {}", path);
        self.send(self.client.get(self.url(path))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_unwraps_envelope() {
        let payload = data(json!({ "Success": true, "Data": ["a", "b"] })).unwrap();
        assert_eq!(payload, json!(["a", "b"]));
    }

    #[test]
    fn test_data_rejects_false_sentinel() {
        assert!(matches!(
            data(json!({ "Data": false })),
            Err(StatwolfError::AuthenticationOrRequest(_))
        ));
    }

    #[test]
    fn test_data_rejects_missing_envelope() {
        assert!(matches!(
            data(json!({ "data": [] })),
            Err(StatwolfError::UnexpectedResponse(_))
        ));
        assert!(matches!(data(json!([1])), Err(StatwolfError::UnexpectedResponse(_))));
    }

    #[test]
    fn test_http_transport_requires_valid_config() {
        let config = ClientConfig::new("https://h.example/dash", "", "p");
        assert!(matches!(
            HttpTransport::new(&config),
            Err(StatwolfError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_http_transport_targets_origin() {
        let config = ClientConfig::new("https://h.example/dash/board", "u", "p");
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.url("/dash/board/v1/full/query"), "https://h.example/dash/board/v1/full/query");
    }
}
