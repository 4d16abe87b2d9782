//! One user's analysis session: at most one live stream at a time.

use crate::aggregator::PipelinePolicy;
use crate::client::{AnalysisClient, AnalysisRequest, SessionContext};
use crate::error::StreamError;
use crate::pipeline::{CancelHandle, FailureKind, StreamEvent, StreamSummary};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Owns the request context and the handle of the stream in flight.
///
/// Every analysis gets a fresh line buffer and result set; nothing is shared
/// between streams. Dropping the session cancels the stream in flight.
#[derive(Debug)]
pub struct AnalysisSession {
    client: AnalysisClient,
    context: SessionContext,
    policy: PipelinePolicy,
    active: Option<CancelHandle>,
}

impl AnalysisSession {
    /// Creates an idle session.
    pub fn new(client: AnalysisClient, context: SessionContext, policy: PipelinePolicy) -> Self {
        Self {
            client,
            context,
            policy,
            active: None,
        }
    }

    /// Current request context.
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Starts a new analysis, cancelling the previous one first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, request: AnalysisRequest) -> ActiveAnalysis {
        self.cancel();

        let cancel = CancelHandle::new();
        let (mut events, receiver) = mpsc::unbounded_channel();
        let client = self.client.clone();
        let context = self.context.clone();
        let policy = self.policy;
        let task_cancel = cancel.clone();
        info!(input = request.input(), kind = ?request.kind(), "starting analysis");
        let task = tokio::spawn(async move {
            client
                .stream(&context, &request, policy, &mut events, &task_cancel)
                .await
        });

        self.active = Some(cancel.clone());
        ActiveAnalysis {
            events: receiver,
            cancel,
            task,
        }
    }

    /// Cancels the stream in flight, if any.
    pub fn cancel(&mut self) {
        if let Some(previous) = self.active.take() {
            if !previous.is_cancelled() {
                info!("cancelling previous analysis");
                previous.cancel();
            }
        }
    }

    /// Reacts to a terminal failure. An unauthorized failure logs the session out.
    pub fn record_failure(&mut self, kind: FailureKind) {
        if kind == FailureKind::Unauthorized && self.context.token().is_some() {
            warn!("analysis service rejected the token; clearing session");
            self.context.clear_token();
        }
    }
}

impl Drop for AnalysisSession {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Handle to a running analysis. Dropping it cancels the stream.
#[derive(Debug)]
pub struct ActiveAnalysis {
    events: mpsc::UnboundedReceiver<StreamEvent>,
    cancel: CancelHandle,
    task: JoinHandle<Result<StreamSummary, StreamError>>,
}

impl ActiveAnalysis {
    /// Next event; `None` once the stream ended or was cancelled.
    ///
    /// Events still queued when cancellation is requested are discarded.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.cancel.is_cancelled() {
            self.events.close();
            return None;
        }
        let event = self.events.recv().await?;
        if self.cancel.is_cancelled() {
            self.events.close();
            return None;
        }
        Some(event)
    }

    /// Handle for cancelling this stream, e.g. from a timeout or signal.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Cancels this stream.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the stream task to finish.
    pub async fn join(mut self) -> Result<StreamSummary, StreamError> {
        match (&mut self.task).await {
            Ok(result) => result,
            Err(err) => Err(StreamError::Body(format!("analysis task failed: {err}"))),
        }
    }
}

impl Drop for ActiveAnalysis {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
