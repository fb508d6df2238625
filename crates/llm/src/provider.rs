use std::future::Future;
use std::pin::Pin;

use snafu::Snafu;
use tokio::sync::{mpsc, oneshot};

/// Chat speaker role in the wire vocabulary of the generative service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_wire_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// One prior conversation turn, projected for the request history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMessage {
    pub role: Role,
    pub text: String,
}

impl ProviderMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// A web reference the model attached to substantiate part of its answer.
///
/// Only produced when grounding was enabled on the request. The address is
/// guaranteed non-empty by the ingestion boundary; the title may be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub title: Option<String>,
    pub uri: String,
}

/// One incremental unit of a streamed response.
///
/// Either list may be empty, but adapters never emit a fragment with both
/// empty; such chunks are dropped at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseFragment {
    pub text_parts: Vec<String>,
    pub citations: Vec<Citation>,
}

impl ResponseFragment {
    pub fn is_empty(&self) -> bool {
        self.text_parts.is_empty() && self.citations.is_empty()
    }
}

/// Event delivered to the stream consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Fragment(ResponseFragment),
    Done,
    Error(String),
}

/// Request shape for one streamed conversation turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub history: Vec<ProviderMessage>,
    pub turn_text: String,
    pub grounding_enabled: bool,
    pub preamble: Option<String>,
}

impl StreamRequest {
    pub fn new(history: Vec<ProviderMessage>, turn_text: impl Into<String>) -> Self {
        Self {
            history,
            turn_text: turn_text.into(),
            grounding_enabled: false,
            preamble: None,
        }
    }

    pub fn with_grounding(mut self, enabled: bool) -> Self {
        self.grounding_enabled = enabled;
        self
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type ProviderWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProviderError {
    #[snafu(display("missing API key for the generative service"))]
    MissingApiKey { stage: &'static str },
    #[snafu(display("stream request has no turn text"))]
    EmptyTurn { stage: &'static str },
    #[snafu(display("http request failed on `{stage}`, {source}"))]
    HttpRequest {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("service returned status {status} on `{stage}`: {message}"))]
    ServiceStatus {
        stage: &'static str,
        status: u16,
        message: String,
    },
    #[snafu(display("failed to decode service response on `{stage}`, {source}"))]
    DecodeResponse {
        stage: &'static str,
        source: serde_json::Error,
    },
}

/// Consumer half of an open stream.
///
/// Dropping the stream signals cancellation to the worker; any fragments
/// already delivered stand as the final observed state.
pub struct ProviderEventStream {
    events: mpsc::UnboundedReceiver<StreamEvent>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

/// Pairs the consumer stream with the worker future that feeds it.
///
/// The caller spawns `worker` onto its runtime and reads `stream` until a
/// terminal event arrives.
pub struct ProviderStreamHandle {
    pub stream: ProviderEventStream,
    pub worker: ProviderWorker,
}

impl std::fmt::Debug for ProviderStreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderStreamHandle")
            .finish_non_exhaustive()
    }
}

impl ProviderEventStream {
    fn new(events: mpsc::UnboundedReceiver<StreamEvent>, cancel_tx: oneshot::Sender<()>) -> Self {
        Self {
            events,
            cancel_tx: Some(cancel_tx),
        }
    }

    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<StreamEvent> {
        self.events.try_recv().ok()
    }

    pub fn cancel(&mut self) -> bool {
        self.cancel_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

impl Drop for ProviderEventStream {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

/// Boundary to the external generative-text service.
///
/// Adapters translate between the service's wire format and the fragment
/// vocabulary above; nothing past this trait sees provider-specific types.
pub trait LlmProvider: Send + Sync {
    /// Opens a streamed conversation turn.
    ///
    /// Resolves once the service has accepted the request, so credential and
    /// connection failures surface here rather than mid-stream.
    fn stream_conversation(
        &self,
        request: StreamRequest,
    ) -> BoxFuture<'_, ProviderResult<ProviderStreamHandle>>;

    /// Single-shot text generation, no streaming.
    fn generate(&self, prompt: String) -> BoxFuture<'_, ProviderResult<String>>;
}

/// Builds the channel plumbing shared by adapters and test doubles.
pub fn make_event_stream() -> (
    mpsc::UnboundedSender<StreamEvent>,
    ProviderEventStream,
    oneshot::Receiver<()>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (
        event_tx,
        ProviderEventStream::new(event_rx, cancel_tx),
        cancel_rx,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_stream_delivers_in_order() {
        let (tx, mut stream, _cancel_rx) = make_event_stream();

        tx.send(StreamEvent::Fragment(ResponseFragment {
            text_parts: vec!["a".to_string()],
            citations: Vec::new(),
        }))
        .unwrap();
        tx.send(StreamEvent::Done).unwrap();
        drop(tx);

        let first = stream.recv().await.unwrap();
        assert!(matches!(first, StreamEvent::Fragment(_)));
        assert_eq!(stream.recv().await, Some(StreamEvent::Done));
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test]
    async fn dropping_stream_signals_cancel() {
        let (_tx, stream, mut cancel_rx) = make_event_stream();
        drop(stream);
        assert!(cancel_rx.try_recv().is_ok());
    }

    #[test]
    fn roles_use_service_vocabulary() {
        assert_eq!(Role::User.as_wire_str(), "user");
        assert_eq!(Role::Model.as_wire_str(), "model");
    }
}
