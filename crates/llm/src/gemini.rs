use eventsource_stream::Eventsource;
use futures::StreamExt;
use snafu::{ResultExt, ensure};
use tokio::sync::{mpsc, oneshot};

use crate::provider::{
    BoxFuture, Citation, DecodeResponseSnafu, EmptyTurnSnafu, HttpRequestSnafu, LlmProvider,
    MissingApiKeySnafu, ProviderResult, ProviderStreamHandle, ProviderWorker, ResponseFragment,
    ServiceStatusSnafu, StreamEvent, StreamRequest, make_event_stream,
};
use crate::wire::{
    Content, GenerateContentChunk, GenerateContentRequest, GenerationConfig, SystemInstruction,
    ThinkingConfig, Tool,
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_CODEGEN_MODEL: &str = "gemini-3-pro-preview";

/// Thinking budget for code synthesis requests. Chat turns do not reserve
/// thinking tokens.
pub const CODEGEN_THINKING_BUDGET: u32 = 2048;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub codegen_model: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into().trim().to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            codegen_model: DEFAULT_CODEGEN_MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim().to_string();
        self
    }
}

/// Adapter for the Gemini `generateContent` REST endpoints.
pub struct GeminiClient {
    config: GeminiConfig,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> ProviderResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "gemini-client-new",
            }
        );

        Ok(Self {
            config,
            http: reqwest::Client::new(),
        })
    }

    fn request_url(&self, model: &str, action: &str) -> String {
        format!(
            "{}/models/{model}:{action}?key={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.api_key,
        )
    }

    fn build_chat_request(&self, request: &StreamRequest) -> GenerateContentRequest {
        let mut contents: Vec<Content> = request
            .history
            .iter()
            .map(|message| Content::text(message.role.as_wire_str(), message.text.clone()))
            .collect();
        contents.push(Content::text("user", request.turn_text.clone()));

        GenerateContentRequest {
            contents,
            system_instruction: request
                .preamble
                .as_deref()
                .map(SystemInstruction::from_text),
            tools: request
                .grounding_enabled
                .then(|| vec![Tool::google_search()]),
            generation_config: None,
        }
    }
}

impl LlmProvider for GeminiClient {
    fn stream_conversation(
        &self,
        request: StreamRequest,
    ) -> BoxFuture<'_, ProviderResult<ProviderStreamHandle>> {
        Box::pin(async move {
            ensure!(
                !request.turn_text.trim().is_empty(),
                EmptyTurnSnafu {
                    stage: "stream-conversation",
                }
            );

            let url = format!(
                "{}&alt=sse",
                self.request_url(&self.config.chat_model, "streamGenerateContent")
            );
            let body = self.build_chat_request(&request);

            tracing::debug!(
                model = %self.config.chat_model,
                history_len = request.history.len(),
                grounding = request.grounding_enabled,
                "opening conversation stream"
            );

            let response = self
                .http
                .post(&url)
                .json(&body)
                .send()
                .await
                .context(HttpRequestSnafu {
                    stage: "open-stream",
                })?;

            let status = response.status();
            if !status.is_success() {
                let payload = response.text().await.unwrap_or_default();
                return ServiceStatusSnafu {
                    stage: "open-stream-status",
                    status: status.as_u16(),
                    message: parse_error_message(&payload, status.as_u16()),
                }
                .fail();
            }

            let (event_tx, stream, cancel_rx) = make_event_stream();
            let worker: ProviderWorker = Box::pin(run_stream_worker(
                response.bytes_stream(),
                request.grounding_enabled,
                event_tx,
                cancel_rx,
            ));

            Ok(ProviderStreamHandle { stream, worker })
        })
    }

    fn generate(&self, prompt: String) -> BoxFuture<'_, ProviderResult<String>> {
        Box::pin(async move {
            ensure!(
                !prompt.trim().is_empty(),
                EmptyTurnSnafu { stage: "generate" }
            );

            let url = self.request_url(&self.config.codegen_model, "generateContent");
            let body = GenerateContentRequest {
                contents: vec![Content::text("user", prompt)],
                system_instruction: None,
                tools: None,
                generation_config: Some(GenerationConfig {
                    thinking_config: Some(ThinkingConfig {
                        thinking_budget: Some(CODEGEN_THINKING_BUDGET),
                    }),
                }),
            };

            let response = self
                .http
                .post(&url)
                .json(&body)
                .send()
                .await
                .context(HttpRequestSnafu {
                    stage: "generate-send",
                })?;

            let status = response.status();
            let payload = response.text().await.context(HttpRequestSnafu {
                stage: "generate-read",
            })?;

            if !status.is_success() {
                return ServiceStatusSnafu {
                    stage: "generate-status",
                    status: status.as_u16(),
                    message: parse_error_message(&payload, status.as_u16()),
                }
                .fail();
            }

            let chunk: GenerateContentChunk =
                serde_json::from_str(&payload).context(DecodeResponseSnafu {
                    stage: "generate-decode",
                })?;

            if let Some(api_error) = chunk.error {
                return ServiceStatusSnafu {
                    stage: "generate-error-body",
                    status: api_error.code.unwrap_or_default() as u16,
                    message: api_error.message,
                }
                .fail();
            }

            Ok(collect_text(&chunk))
        })
    }
}

async fn run_stream_worker<S>(
    byte_stream: S,
    grounding_enabled: bool,
    event_tx: mpsc::UnboundedSender<StreamEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
) where
    S: futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
{
    let mut events = Box::pin(byte_stream.eventsource());
    let mut cancelled = false;
    let mut failed = false;

    loop {
        tokio::select! {
            _ = &mut cancel_rx => {
                cancelled = true;
                tracing::debug!("conversation stream cancelled by consumer");
                break;
            }
            next_event = events.next() => {
                match next_event {
                    Some(Ok(event)) => {
                        if event.data.trim().is_empty() {
                            continue;
                        }

                        let chunk: GenerateContentChunk = match serde_json::from_str(&event.data) {
                            Ok(chunk) => chunk,
                            Err(error) => {
                                tracing::warn!(error = %error, "skipping unparseable stream chunk");
                                continue;
                            }
                        };

                        if let Some(api_error) = chunk.error {
                            failed = true;
                            tracing::warn!(
                                code = ?api_error.code,
                                "service reported an in-stream error"
                            );
                            let _ = event_tx.send(StreamEvent::Error(api_error.message));
                            break;
                        }

                        if let Some(fragment) = fragment_from_chunk(&chunk, grounding_enabled)
                            && event_tx.send(StreamEvent::Fragment(fragment)).is_err()
                        {
                            return;
                        }
                    }
                    Some(Err(source)) => {
                        failed = true;
                        tracing::warn!(error = %source, "transport error while reading stream");
                        let _ = event_tx.send(StreamEvent::Error(source.to_string()));
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    if !cancelled && !failed {
        let _ = event_tx.send(StreamEvent::Done);
    }
}

/// Normalizes one wire chunk into the strict fragment schema.
///
/// Citation entries without a usable address are skipped, and all citation
/// data is dropped unless grounding was enabled on the request. Chunks that
/// contribute neither text nor citations map to `None`.
fn fragment_from_chunk(
    chunk: &GenerateContentChunk,
    grounding_enabled: bool,
) -> Option<ResponseFragment> {
    let candidate = chunk.candidates.as_deref()?.first()?;
    let mut fragment = ResponseFragment::default();

    if grounding_enabled
        && let Some(grounding) = &candidate.grounding_metadata
        && let Some(grounding_chunks) = &grounding.grounding_chunks
    {
        for grounding_chunk in grounding_chunks {
            let Some(web) = &grounding_chunk.web else {
                continue;
            };
            let Some(uri) = web
                .uri
                .as_deref()
                .map(str::trim)
                .filter(|uri| !uri.is_empty())
            else {
                continue;
            };

            fragment.citations.push(Citation {
                title: web
                    .title
                    .as_deref()
                    .map(str::trim)
                    .filter(|title| !title.is_empty())
                    .map(str::to_string),
                uri: uri.to_string(),
            });
        }
    }

    if let Some(content) = &candidate.content {
        for part in &content.parts {
            if part.thought.unwrap_or(false) {
                continue;
            }
            if let Some(text) = &part.text
                && !text.is_empty()
            {
                fragment.text_parts.push(text.clone());
            }
        }
    }

    if fragment.is_empty() {
        None
    } else {
        Some(fragment)
    }
}

fn collect_text(chunk: &GenerateContentChunk) -> String {
    let Some(candidate) = chunk
        .candidates
        .as_deref()
        .and_then(|candidates| candidates.first())
    else {
        return String::new();
    };
    let Some(content) = &candidate.content else {
        return String::new();
    };

    content
        .parts
        .iter()
        .filter(|part| !part.thought.unwrap_or(false))
        .filter_map(|part| part.text.as_deref())
        .collect()
}

fn parse_error_message(body: &str, status: u16) -> String {
    match serde_json::from_str::<GenerateContentChunk>(body) {
        Ok(chunk) => chunk
            .error
            .map(|error| error.message)
            .unwrap_or_else(|| format!("HTTP {status}")),
        Err(_) => format!("HTTP {status}: {body}"),
    }
}
