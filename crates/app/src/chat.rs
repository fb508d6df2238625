use std::sync::Arc;

use kismet_llm::{
    LlmProvider, ProviderMessage, ProviderStreamHandle, Role, StreamEvent, StreamRequest,
};
use kismet_store::{Message, Sender, Session, SessionStore};

use crate::prompts;
use crate::reconcile::StreamReconciler;

/// Fixed transcript text appended when a turn fails.
pub const TURN_ERROR_TEXT: &str = "I encountered an error processing your request. \
Please check your network connection or API key.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Dropped without side effects: blank input or a turn already in flight.
    Ignored,
    Settled,
    Failed,
}

/// Drives one user-submit → model-respond cycle against the active session.
///
/// Turn lifecycle: append the user message, open the stream, insert one
/// empty assistant placeholder, then fold fragments into that placeholder
/// one store update per fragment. A failure at any point appends a separate
/// error-flagged message and leaves whatever partial text already landed.
pub struct ChatTurnRunner {
    provider: Arc<dyn LlmProvider>,
    busy: bool,
}

impl ChatTurnRunner {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            busy: false,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Runs one turn. `observe` fires after each applied fragment with that
    /// fragment's text, for incremental display.
    pub async fn submit<F>(
        &mut self,
        store: &mut SessionStore,
        input: &str,
        grounding_enabled: bool,
        observe: F,
    ) -> TurnOutcome
    where
        F: FnMut(&str),
    {
        // Single-flight per session: a second submission mid-turn is
        // dropped, not queued.
        if self.busy || input.trim().is_empty() {
            return TurnOutcome::Ignored;
        }

        self.busy = true;
        let outcome = self
            .run_turn(store, input, grounding_enabled, observe)
            .await;
        // Cleared on every exit path so a failed turn can never leave the
        // runner stuck in flight.
        self.busy = false;
        outcome
    }

    async fn run_turn<F>(
        &self,
        store: &mut SessionStore,
        input: &str,
        grounding_enabled: bool,
        mut observe: F,
    ) -> TurnOutcome
    where
        F: FnMut(&str),
    {
        let session_id = store.active_session_id();
        let history = store
            .active_session()
            .map(project_history)
            .unwrap_or_default();

        store.append_message(session_id, Message::user(input));

        let request = StreamRequest::new(history, input)
            .with_grounding(grounding_enabled)
            .with_preamble(prompts::SYSTEM_INSTRUCTION);

        tracing::debug!(
            session_id = ?session_id,
            grounding = grounding_enabled,
            "submitting chat turn"
        );

        let handle = match self.provider.stream_conversation(request).await {
            Ok(handle) => handle,
            Err(error) => {
                tracing::warn!(error = %error, "failed to open conversation stream");
                store.append_message(session_id, Message::assistant_error(TURN_ERROR_TEXT));
                return TurnOutcome::Failed;
            }
        };

        let ProviderStreamHandle { mut stream, worker } = handle;
        let worker_task = tokio::spawn(worker);

        let placeholder = Message::assistant_placeholder();
        let placeholder_id = placeholder.id;
        store.append_message(session_id, placeholder);

        let mut reconciler = StreamReconciler::new();
        let outcome = loop {
            match stream.recv().await {
                Some(StreamEvent::Fragment(fragment)) => {
                    let delta = fragment.text_parts.concat();
                    let patch = reconciler.apply(&fragment);
                    store.update_message(session_id, placeholder_id, patch);
                    if !delta.is_empty() {
                        observe(&delta);
                    }
                }
                Some(StreamEvent::Done) => break TurnOutcome::Settled,
                Some(StreamEvent::Error(message)) => {
                    tracing::warn!(error = %message, "conversation stream failed mid-turn");
                    store.append_message(session_id, Message::assistant_error(TURN_ERROR_TEXT));
                    break TurnOutcome::Failed;
                }
                None => {
                    tracing::warn!("conversation stream ended without a terminal event");
                    store.append_message(session_id, Message::assistant_error(TURN_ERROR_TEXT));
                    break TurnOutcome::Failed;
                }
            }
        };

        let _ = worker_task.await;
        outcome
    }
}

/// Projects prior session messages into the role-tagged request history.
/// Empty-text messages (e.g. a placeholder left by an aborted turn) are
/// omitted; the service rejects empty parts.
fn project_history(session: &Session) -> Vec<ProviderMessage> {
    session
        .messages
        .iter()
        .filter(|message| !message.text.trim().is_empty())
        .map(|message| {
            let role = match message.sender {
                Sender::User => Role::User,
                Sender::Assistant => Role::Model,
            };
            ProviderMessage::new(role, message.text.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use kismet_llm::{
        BoxFuture, Citation, ProviderError, ProviderResult, ProviderWorker, ResponseFragment,
        make_event_stream,
    };
    use kismet_store::{SessionMode, StateStore, StoreResult};

    use super::*;

    enum ScriptedCall {
        FailOpen,
        Stream(Vec<StreamEvent>),
    }

    /// Provider double that replays a scripted event sequence per call and
    /// records every request it receives.
    struct ScriptedProvider {
        calls: Mutex<VecDeque<ScriptedCall>>,
        requests: Mutex<Vec<StreamRequest>>,
    }

    impl ScriptedProvider {
        fn new(calls: Vec<ScriptedCall>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(calls.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<StreamRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl LlmProvider for ScriptedProvider {
        fn stream_conversation(
            &self,
            request: StreamRequest,
        ) -> BoxFuture<'_, ProviderResult<ProviderStreamHandle>> {
            Box::pin(async move {
                self.requests.lock().unwrap().push(request);
                let call = self
                    .calls
                    .lock()
                    .unwrap()
                    .pop_front()
                    .expect("unscripted stream_conversation call");

                match call {
                    ScriptedCall::FailOpen => Err(ProviderError::MissingApiKey {
                        stage: "scripted-open",
                    }),
                    ScriptedCall::Stream(events) => {
                        let (event_tx, stream, _cancel_rx) = make_event_stream();
                        let worker: ProviderWorker = Box::pin(async move {
                            for event in events {
                                let _ = event_tx.send(event);
                            }
                        });
                        Ok(ProviderStreamHandle { stream, worker })
                    }
                }
            })
        }

        fn generate(&self, _prompt: String) -> BoxFuture<'_, ProviderResult<String>> {
            Box::pin(async {
                Err(ProviderError::MissingApiKey {
                    stage: "scripted-generate",
                })
            })
        }
    }

    /// Substrate double that keeps everything in memory.
    #[derive(Default)]
    struct MemoryState {
        value: Mutex<Option<String>>,
    }

    impl StateStore for MemoryState {
        fn read(&self) -> StoreResult<Option<String>> {
            Ok(self.value.lock().unwrap().clone())
        }

        fn write(&self, payload: &str) -> StoreResult<()> {
            *self.value.lock().unwrap() = Some(payload.to_string());
            Ok(())
        }

        fn clear(&self) -> StoreResult<()> {
            *self.value.lock().unwrap() = None;
            Ok(())
        }
    }

    fn fresh_store() -> SessionStore {
        SessionStore::load(Box::new(MemoryState::default()))
    }

    fn text_event(text: &str) -> StreamEvent {
        StreamEvent::Fragment(ResponseFragment {
            text_parts: vec![text.to_string()],
            citations: Vec::new(),
        })
    }

    #[tokio::test]
    async fn blank_input_is_ignored_without_side_effects() {
        let provider = ScriptedProvider::new(Vec::new());
        let mut runner = ChatTurnRunner::new(provider.clone());
        let mut store = fresh_store();
        let before = store.active_session().unwrap().messages.len();

        let outcome = runner.submit(&mut store, "   \n", false, |_| {}).await;

        assert_eq!(outcome, TurnOutcome::Ignored);
        assert_eq!(store.active_session().unwrap().messages.len(), before);
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn successful_turn_streams_into_one_placeholder() {
        let provider = ScriptedProvider::new(vec![ScriptedCall::Stream(vec![
            text_event("Use the "),
            text_event("Replicated specifier."),
            StreamEvent::Done,
        ])]);
        let mut runner = ChatTurnRunner::new(provider.clone());
        let mut store = fresh_store();

        let mut deltas = Vec::new();
        let outcome = runner
            .submit(&mut store, "How do I replicate a variable?", false, |delta| {
                deltas.push(delta.to_string());
            })
            .await;

        assert_eq!(outcome, TurnOutcome::Settled);
        assert!(!runner.is_busy());
        assert_eq!(deltas, vec!["Use the ", "Replicated specifier."]);

        let session = store.active_session().unwrap();
        // Welcome, user turn, assistant answer.
        assert_eq!(session.messages.len(), 3);
        assert_eq!(session.title, "How do I replicate a variable?");

        let answer = &session.messages[2];
        assert_eq!(answer.sender, Sender::Assistant);
        assert_eq!(answer.text, "Use the Replicated specifier.");
        assert!(!answer.is_error);
        assert_eq!(answer.sources, None);
    }

    #[tokio::test]
    async fn history_projects_prior_messages_with_service_roles() {
        let provider = ScriptedProvider::new(vec![ScriptedCall::Stream(vec![StreamEvent::Done])]);
        let mut runner = ChatTurnRunner::new(provider.clone());
        let mut store = fresh_store();

        runner.submit(&mut store, "first question", true, |_| {}).await;

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];

        // The seeded welcome precedes the turn; the new turn text travels
        // separately from the history.
        assert_eq!(request.history.len(), 1);
        assert_eq!(request.history[0].role, Role::Model);
        assert_eq!(request.turn_text, "first question");
        assert!(request.grounding_enabled);
        assert!(request.preamble.is_some());
    }

    #[tokio::test]
    async fn open_failure_appends_error_without_placeholder() {
        let provider = ScriptedProvider::new(vec![ScriptedCall::FailOpen]);
        let mut runner = ChatTurnRunner::new(provider);
        let mut store = fresh_store();

        let outcome = runner.submit(&mut store, "hello", false, |_| {}).await;

        assert_eq!(outcome, TurnOutcome::Failed);
        assert!(!runner.is_busy());

        let session = store.active_session().unwrap();
        // Welcome, user turn, error message; no placeholder was created.
        assert_eq!(session.messages.len(), 3);
        let error = &session.messages[2];
        assert!(error.is_error);
        assert_eq!(error.text, TURN_ERROR_TEXT);
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_partial_text_and_appends_error() {
        let provider = ScriptedProvider::new(vec![
            ScriptedCall::Stream(vec![
                text_event("Use the "),
                StreamEvent::Error("connection reset".to_string()),
            ]),
            ScriptedCall::Stream(vec![StreamEvent::Done]),
        ]);
        let mut runner = ChatTurnRunner::new(provider);
        let mut store = fresh_store();

        let outcome = runner.submit(&mut store, "how?", false, |_| {}).await;
        assert_eq!(outcome, TurnOutcome::Failed);

        let session = store.active_session().unwrap();
        // Welcome, user, partial placeholder, error message: both assistant
        // messages stay visible.
        assert_eq!(session.messages.len(), 4);
        assert_eq!(session.messages[2].text, "Use the ");
        assert!(!session.messages[2].is_error);
        assert_eq!(session.messages[3].text, TURN_ERROR_TEXT);
        assert!(session.messages[3].is_error);

        // The busy flag cleared, so the next submission is accepted.
        let outcome = runner.submit(&mut store, "again?", false, |_| {}).await;
        assert_eq!(outcome, TurnOutcome::Settled);
    }

    #[tokio::test]
    async fn empty_model_response_settles_with_empty_placeholder() {
        let provider = ScriptedProvider::new(vec![ScriptedCall::Stream(vec![StreamEvent::Done])]);
        let mut runner = ChatTurnRunner::new(provider);
        let mut store = fresh_store();

        let outcome = runner.submit(&mut store, "say nothing", false, |_| {}).await;
        assert_eq!(outcome, TurnOutcome::Settled);

        let session = store.active_session().unwrap();
        assert_eq!(session.messages.len(), 3);
        assert_eq!(session.messages[2].text, "");
        assert!(!session.messages[2].is_error);
    }

    #[tokio::test]
    async fn citations_accumulate_onto_the_streamed_message() {
        let provider = ScriptedProvider::new(vec![ScriptedCall::Stream(vec![
            StreamEvent::Fragment(ResponseFragment {
                text_parts: vec!["Grounded answer".to_string()],
                citations: vec![Citation {
                    title: Some("Replication".to_string()),
                    uri: "https://docs.unrealengine.com/replication".to_string(),
                }],
            }),
            StreamEvent::Fragment(ResponseFragment {
                text_parts: Vec::new(),
                citations: vec![Citation {
                    title: None,
                    uri: "https://docs.unrealengine.com/networking".to_string(),
                }],
            }),
            StreamEvent::Done,
        ])]);
        let mut runner = ChatTurnRunner::new(provider);
        let mut store = fresh_store();

        runner.submit(&mut store, "with sources", true, |_| {}).await;

        let session = store.active_session().unwrap();
        let sources = session.messages[2].sources.as_ref().unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].title.as_deref(), Some("Replication"));
        assert_eq!(sources[1].display_title(), "Untitled source");
    }

    #[tokio::test]
    async fn aborted_placeholder_is_dropped_from_later_histories() {
        let provider = ScriptedProvider::new(vec![
            ScriptedCall::Stream(vec![StreamEvent::Error("boom".to_string())]),
            ScriptedCall::Stream(vec![StreamEvent::Done]),
        ]);
        let mut runner = ChatTurnRunner::new(provider.clone());
        let mut store = fresh_store();

        runner.submit(&mut store, "first", false, |_| {}).await;
        runner.submit(&mut store, "second", false, |_| {}).await;

        let requests = provider.requests();
        let second_history = &requests[1].history;
        // Welcome, "first", the fixed error text; the empty placeholder from
        // the failed turn is filtered out.
        assert_eq!(second_history.len(), 3);
        assert!(second_history.iter().all(|m| !m.text.trim().is_empty()));
    }

    #[test]
    fn new_store_starts_with_a_usable_active_session() {
        let store = fresh_store();
        assert_eq!(store.sessions().len(), 1);
        assert_eq!(store.active_mode(), SessionMode::Chat);
    }
}
