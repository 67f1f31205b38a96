//! HTTP client for action calls.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Url;

use crate::error::ActionError;
use crate::wire::{ActionResponse, ErrorResponse};
use crate::{Action, ActionResult, ActionTransport, CallMetadata};

/// Action transport over plain HTTP.
#[derive(Debug, Clone)]
pub struct HttpActionClient {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpActionClient {
    /// Create a client for a server at `base_url` (e.g. `http://127.0.0.1:8815`).
    pub fn new(base_url: &str) -> Result<Self, ActionError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ActionError::InvalidEndpoint(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ActionError::InvalidEndpoint(base_url.to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Client for `http://{host}:{port}`.
    pub fn for_host(host: &str, port: u16) -> Result<Self, ActionError> {
        Self::new(&format!("http://{}:{}", host, port))
    }

    /// Build the URL for an action, percent-encoding the kind.
    pub fn action_url(&self, kind: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["v1", "actions", kind]);
        }
        url
    }

    fn headers(metadata: &CallMetadata) -> Result<HeaderMap, ActionError> {
        let mut headers = HeaderMap::with_capacity(metadata.len());
        for (key, value) in metadata.iter() {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| ActionError::InvalidMetadata(key.to_string()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| ActionError::InvalidMetadata(key.to_string()))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    async fn handle_error<T>(response: reqwest::Response) -> Result<T, ActionError> {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        let error = match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(error) => ActionError::rejected(status, error.code, error.message),
            Err(_) => ActionError::rejected(status, "unknown", body),
        };
        Err(error)
    }
}

#[async_trait]
impl ActionTransport for HttpActionClient {
    async fn do_action(
        &self,
        action: Action,
        metadata: &CallMetadata,
    ) -> Result<Vec<ActionResult>, ActionError> {
        let response = self
            .client
            .post(self.action_url(&action.kind))
            .headers(Self::headers(metadata)?)
            .body(action.body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Self::handle_error(response).await;
        }

        let body = response
            .json::<ActionResponse>()
            .await
            .map_err(|e| ActionError::Decode(e.to_string()))?;
        body.into_results()
    }
}
