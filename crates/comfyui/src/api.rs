//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps the three endpoints the service drives (queue inspection,
//! workflow submission, history retrieval) using [`reqwest`], each with
//! its own request timeout.

use std::time::Duration;

use fluxgen_core::workflow::WorkflowGraph;
use reqwest::header::CACHE_CONTROL;

use crate::messages::{HistoryResponse, QueueSnapshot, SubmitResponse};

/// Per-endpoint request timeouts.
#[derive(Debug, Clone)]
pub struct ApiTimeouts {
    pub queue: Duration,
    pub submit: Duration,
    pub history: Duration,
}

impl Default for ApiTimeouts {
    fn default() -> Self {
        Self {
            queue: Duration::from_secs(5),
            submit: Duration::from_secs(30),
            history: Duration::from_secs(10),
        }
    }
}

/// HTTP client for a single ComfyUI instance.
#[derive(Clone)]
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
    timeouts: ApiTimeouts,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The body arrived but did not have the expected shape.
    #[error("Unexpected ComfyUI response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The configured base URL cannot carry endpoint paths.
    #[error("Invalid ComfyUI URL: {0}")]
    InvalidUrl(String),
}

impl ComfyUIApiError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ComfyUIApiError::Request(e) if e.is_timeout())
    }
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`.
    pub fn new(api_url: String) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            timeouts: ApiTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: ApiTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// HTTP API base URL (e.g. `http://host:8188`).
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Read the live queue (`GET /queue`).
    pub async fn get_queue(&self) -> Result<QueueSnapshot, ComfyUIApiError> {
        let response = self
            .client
            .get(self.endpoint(&["queue"])?)
            .timeout(self.timeouts.queue)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Submit a workflow for execution.
    ///
    /// Sends a `POST /prompt` request with the given workflow and client
    /// ID. Returns the server's reply, which normally carries the
    /// `prompt_id` and queue position.
    pub async fn submit_workflow(
        &self,
        workflow: &WorkflowGraph,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(self.endpoint(&["prompt"])?)
            .timeout(self.timeouts.submit)
            .json(&body)
            .send()
            .await?;

        let submitted: SubmitResponse = Self::parse_response(response).await?;
        tracing::debug!(
            prompt_id = ?submitted.prompt_id,
            number = ?submitted.number,
            "Workflow queued on ComfyUI at {}",
            self.api_url,
        );
        Ok(submitted)
    }

    /// Retrieve execution history for a specific prompt.
    ///
    /// Sends a `GET /history/{prompt_id}` request, bypassing caches. The
    /// body is an empty object until the prompt has finished. The id is
    /// percent-encoded as a single path segment.
    pub async fn get_history(&self, prompt_id: &str) -> Result<HistoryResponse, ComfyUIApiError> {
        let response = self
            .client
            .get(self.endpoint(&["history", prompt_id])?)
            .header(CACHE_CONTROL, "no-cache")
            .timeout(self.timeouts.history)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Reachability probe against `GET /history`.
    pub async fn ping(&self) -> Result<(), ComfyUIApiError> {
        let mut url = self.endpoint(&["history"])?;
        url.query_pairs_mut().append_pair("max_items", "1");

        let response = self
            .client
            .get(url)
            .timeout(self.timeouts.history)
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }

    // ---- private helpers ----

    /// Base URL with `segments` appended, each encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, ComfyUIApiError> {
        let mut url = reqwest::Url::parse(&self.api_url)
            .map_err(|e| ComfyUIApiError::InvalidUrl(format!("{}: {e}", self.api_url)))?;
        url.path_segments_mut()
            .map_err(|()| ComfyUIApiError::InvalidUrl(self.api_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    ///
    /// Decoding goes through `serde_json` directly so shape mismatches are
    /// reported as [`ComfyUIApiError::Decode`], distinct from transport errors.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use fluxgen_core::workflow::{InputValue, WorkflowNode};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tiny_workflow() -> WorkflowGraph {
        let mut graph = WorkflowGraph::new();
        graph.insert(
            "54",
            WorkflowNode::new("CLIPTextEncode").with_input("text", InputValue::text("a cat")),
        );
        graph
    }

    #[tokio::test]
    async fn get_queue_parses_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/queue"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "queue_running": [[0, "abc", {}, {}, []]],
                "queue_pending": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = ComfyUIApi::new(server.uri());
        let snapshot = api.get_queue().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.running_ids().contains("abc"));
    }

    #[tokio::test]
    async fn submit_posts_prompt_and_client_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt"))
            .and(body_partial_json(json!({
                "prompt": { "54": { "class_type": "CLIPTextEncode", "inputs": { "text": "a cat" } } },
                "client_id": "client-1"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "prompt_id": "p-1", "number": 4 })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let api = ComfyUIApi::new(format!("{}/", server.uri()));
        let resp = api.submit_workflow(&tiny_workflow(), "client-1").await.unwrap();
        assert_eq!(resp.prompt_id.as_deref(), Some("p-1"));
        assert_eq!(resp.number, Some(4));
    }

    #[tokio::test]
    async fn non_success_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let api = ComfyUIApi::new(server.uri());
        let err = api.submit_workflow(&tiny_workflow(), "c").await.unwrap_err();
        assert_matches!(err, ComfyUIApiError::ApiError { status: 500, ref body } if body == "boom");
    }

    #[tokio::test]
    async fn history_sends_no_cache_and_parses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/history/abc"))
            .and(header("cache-control", "no-cache"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "abc": { "outputs": { "17": { "images": [{ "filename": "a.png" }] } } }
            })))
            .mount(&server)
            .await;

        let api = ComfyUIApi::new(server.uri());
        let history = api.get_history("abc").await.unwrap();
        assert!(history.contains_key("abc"));
    }

    #[tokio::test]
    async fn history_id_stays_inside_its_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/history/x%2F..%2F..%2Fqueue"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/history/other%3Fjunk%23frag"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "other?junk#frag": { "outputs": {} }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = ComfyUIApi::new(server.uri());
        assert!(api.get_history("x/../../queue").await.unwrap().is_empty());
        let history = api.get_history("other?junk#frag").await.unwrap();
        assert!(history.contains_key("other?junk#frag"));

        let requests = server.received_requests().await.unwrap();
        assert!(requests.iter().all(|r| r.url.path().starts_with("/history/")));
        assert!(requests.iter().all(|r| r.url.query().is_none()));
    }

    #[tokio::test]
    async fn base_url_path_prefix_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/comfy/queue"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "queue_running": [],
                "queue_pending": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = ComfyUIApi::new(format!("{}/comfy/", server.uri()));
        assert!(api.get_queue().await.unwrap().is_empty());
    }

    #[test]
    fn unusable_base_url_is_rejected() {
        let api = ComfyUIApi::new("not a url".to_string());
        assert_matches!(api.endpoint(&["queue"]), Err(ComfyUIApiError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn slow_submit_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "prompt_id": "late" }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let api = ComfyUIApi::new(server.uri()).with_timeouts(ApiTimeouts {
            submit: Duration::from_millis(50),
            ..Default::default()
        });
        let err = api.submit_workflow(&tiny_workflow(), "c").await.unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {err:?}");
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/queue"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let api = ComfyUIApi::new(server.uri());
        assert_matches!(api.get_queue().await, Err(ComfyUIApiError::Decode(_)));
    }

    #[tokio::test]
    async fn slow_queue_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/queue"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let api = ComfyUIApi::new(server.uri()).with_timeouts(ApiTimeouts {
            queue: Duration::from_millis(50),
            ..Default::default()
        });
        let err = api.get_queue().await.unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {err:?}");
    }
}
