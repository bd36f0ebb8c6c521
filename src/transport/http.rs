use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value as JsonValue;
use tracing::debug;

use super::{Transport, TransportError, CONTENT_TYPE_JSON};
use crate::config::ClientConfig;

/// [`Transport`] over `reqwest`, posting to `<base url><path>`.
///
/// Error statuses that still carry a JSON object are reported as store
/// rejections (`"success": false` is filled in when the server left it
/// out); error statuses with any other body become
/// [`TransportError::Status`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    http: Client,
}

impl HttpTransport {
    /// Builds a transport for the graph described by `config`.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let mut builder = Client::builder();
        if let Some(timeout_ms) = config.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        Ok(Self {
            base_url: config.base_url(),
            http: builder.build()?,
        })
    }

    /// URL that request paths are appended to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(extra: &[(&str, &str)]) -> Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
        for (name, value) in extra {
            let invalid = || TransportError::InvalidHeader {
                name: (*name).to_owned(),
            };
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(
        &self,
        path: &str,
        body: &JsonValue,
        headers: &[(&str, &str)],
    ) -> Result<JsonValue, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        let payload = serde_json::to_vec(body)?;
        let response = self
            .http
            .post(&url)
            .headers(Self::headers(headers)?)
            .body(payload)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(%url, status = status.as_u16(), bytes = text.len(), "store responded");

        match serde_json::from_str::<JsonValue>(&text) {
            Ok(mut parsed) if !status.is_success() => match parsed.as_object_mut() {
                Some(obj) => {
                    obj.entry("success").or_insert(JsonValue::Bool(false));
                    Ok(parsed)
                }
                None => Err(TransportError::Status {
                    status: status.as_u16(),
                    body: text,
                }),
            },
            Ok(parsed) => Ok(parsed),
            Err(_) if !status.is_success() => Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            }),
            Err(err) => Err(TransportError::Decode(err)),
        }
    }
}
