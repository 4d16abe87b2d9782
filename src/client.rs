//! HTTP client for the streaming analysis endpoint.

use crate::aggregator::{Aggregator, PipelinePolicy, StreamStats};
use crate::error::{RequestError, StreamError};
use crate::pipeline::{consume, CancelHandle, StreamEnd, StreamObserver, StreamSummary};
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::{Client, Response};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const USER_AGENT: &str = concat!("product-stream/", env!("CARGO_PKG_VERSION"));
const STREAM_PATH: &str = "product/stream";
const EVENT_STREAM: &str = "text/event-stream";

/// Shortest input the service accepts, in characters.
pub const MIN_INPUT_CHARS: usize = 3;
/// Longest input the service accepts, in characters.
pub const MAX_INPUT_CHARS: usize = 1000;

/// How the service should interpret the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    /// A product page link.
    Url,
    /// A free-text product description.
    Description,
}

impl InputKind {
    /// Inputs starting with `https` are links; anything else is a description.
    pub fn infer(input: &str) -> Self {
        if input.starts_with("https") {
            InputKind::Url
        } else {
            InputKind::Description
        }
    }
}

/// Validated request body for the stream endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisRequest {
    input: String,
    #[serde(rename = "type")]
    kind: InputKind,
}

impl AnalysisRequest {
    /// Builds a request, inferring the kind from the input.
    pub fn new(input: impl Into<String>) -> Result<Self, RequestError> {
        let input = input.into();
        let kind = InputKind::infer(input.trim());
        Self::with_kind(input, kind)
    }

    /// Builds a request with an explicit kind.
    pub fn with_kind(input: impl Into<String>, kind: InputKind) -> Result<Self, RequestError> {
        let input = input.into().trim().to_string();
        let len = input.chars().count();
        if len < MIN_INPUT_CHARS {
            return Err(RequestError::TooShort {
                min: MIN_INPUT_CHARS,
                len,
            });
        }
        if len > MAX_INPUT_CHARS {
            return Err(RequestError::TooLong {
                max: MAX_INPUT_CHARS,
                len,
            });
        }
        Ok(Self { input, kind })
    }

    /// The trimmed query text.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Input interpretation sent to the service.
    pub fn kind(&self) -> InputKind {
        self.kind
    }
}

/// Per-user request context: where to send requests and with which credentials.
///
/// Owned by the caller and passed into every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    stream_url: Url,
    token: Option<String>,
}

impl SessionContext {
    /// Creates a context for the service rooted at `endpoint`.
    pub fn new(endpoint: &str, token: Option<String>) -> Result<Self, RequestError> {
        let mut base = Url::parse(endpoint)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            stream_url: base.join(STREAM_PATH)?,
            token: token.filter(|token| !token.trim().is_empty()),
        })
    }

    /// Full URL of the stream endpoint.
    pub fn stream_url(&self) -> &Url {
        &self.stream_url
    }

    /// Bearer token, if logged in.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Forgets the bearer token.
    pub fn clear_token(&mut self) {
        self.token = None;
    }
}

/// Thin wrapper over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    http: Client,
}

impl AnalysisClient {
    /// Builds the HTTP client. The body read has no overall timeout; see
    /// [`CancelHandle::cancel_after`].
    pub fn new(connect_timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self { http })
    }

    /// Sends the request and checks the response status.
    pub async fn open(
        &self,
        context: &SessionContext,
        request: &AnalysisRequest,
    ) -> Result<Response, StreamError> {
        let mut builder = self
            .http
            .post(context.stream_url().clone())
            .header(ACCEPT, HeaderValue::from_static(EVENT_STREAM))
            .json(request);
        if let Some(token) = context.token() {
            builder = builder.bearer_auth(token);
        }

        debug!(url = %context.stream_url(), kind = ?request.kind(), "opening analysis stream");
        let response = builder.send().await?;
        match StreamError::from_status(response.status()) {
            Some(err) => Err(err),
            None => Ok(response),
        }
    }

    /// Opens the stream and consumes it to the end, publishing to `observer`.
    ///
    /// Cancellation and a closed observer are honoured while connecting as well as
    /// between chunks.
    pub async fn stream<O>(
        &self,
        context: &SessionContext,
        request: &AnalysisRequest,
        policy: PipelinePolicy,
        observer: &mut O,
        cancel: &CancelHandle,
    ) -> Result<StreamSummary, StreamError>
    where
        O: StreamObserver + ?Sized,
    {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            _ = observer.closed() => None,
            opened = self.open(context, request) => Some(opened),
        };
        let response = match opened {
            Some(Ok(response)) => response,
            Some(Err(err)) => {
                info!(error = %err, "analysis request rejected");
                observer.on_failure(&err);
                return Err(err);
            }
            None => {
                return Ok(StreamSummary {
                    end: StreamEnd::Cancelled,
                    snapshot: None,
                    stats: StreamStats::default(),
                })
            }
        };

        let aggregator = Aggregator::new(request.input(), policy);
        consume(response.bytes_stream(), aggregator, observer, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn infers_kind_from_prefix() {
        let url = AnalysisRequest::new("  https://shop.test/item/1 ").expect("valid");
        assert_eq!(url.kind(), InputKind::Url);
        assert_eq!(url.input(), "https://shop.test/item/1");
        let text = AnalysisRequest::new("quiet electric kettle").expect("valid");
        assert_eq!(text.kind(), InputKind::Description);
        let plain = AnalysisRequest::new("http://shop.test/item").expect("valid");
        assert_eq!(plain.kind(), InputKind::Description);
    }

    #[test]
    fn validates_length_in_characters() {
        assert_eq!(
            AnalysisRequest::new(" ab "),
            Err(RequestError::TooShort { min: 3, len: 2 })
        );
        assert!(AnalysisRequest::new("äöü").is_ok());
        assert_eq!(
            AnalysisRequest::new("x".repeat(1001)),
            Err(RequestError::TooLong {
                max: 1000,
                len: 1001
            })
        );
    }

    #[test]
    fn serializes_request_body() {
        let request =
            AnalysisRequest::with_kind("best kettle", InputKind::Description).expect("valid");
        assert_eq!(
            serde_json::to_value(&request).expect("json"),
            serde_json::json!({"input": "best kettle", "type": "description"})
        );
    }

    #[test]
    fn joins_stream_path_onto_endpoint() {
        let root = SessionContext::new("http://localhost:8080", None).expect("valid");
        assert_eq!(
            root.stream_url().as_str(),
            "http://localhost:8080/product/stream"
        );
        let nested = SessionContext::new("https://api.test/v2", Some("tok".into())).expect("valid");
        assert_eq!(
            nested.stream_url().as_str(),
            "https://api.test/v2/product/stream"
        );
        assert_eq!(nested.token(), Some("tok"));
        assert!(SessionContext::new("not a url", None).is_err());
    }

    #[test]
    fn blank_token_counts_as_logged_out() {
        let mut context = SessionContext::new("http://localhost:8080", Some("  ".into()))
            .expect("valid");
        assert_eq!(context.token(), None);
        context.clear_token();
        assert_eq!(context.token(), None);
    }
}
