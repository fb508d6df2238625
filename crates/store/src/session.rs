use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title given to a session before its first real user turn.
pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

/// Maximum number of characters carried over from the first user message
/// into the session title.
pub const SESSION_TITLE_MAX_CHARS: usize = 30;

const TITLE_ELLIPSIS: &str = "...";

const CHAT_WELCOME: &str = "Welcome, Developer. I am your Unreal Engine AI Assistant. \
I can help you with C++ syntax, Blueprint logic, or searching the latest UE5 documentation. \
How can I assist you today?";

const BLUEPRINT_WELCOME: &str = "Welcome, Developer. Describe the Blueprint logic you need \
and I will walk you through the graphs, nodes, and variables that build it.";

/// Stable identifier for one conversation session.
///
/// v7 UUIDs keep identifiers roughly time-ordered, which the recency sort
/// uses as a tie-breaker.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

/// Stable identifier for one message within a session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

/// Usage context a session was opened under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionMode {
    #[default]
    Chat,
    Blueprint,
}

impl SessionMode {
    /// Text of the assistant message seeded into a fresh session.
    pub fn welcome_text(self) -> &'static str {
        match self {
            Self::Chat => CHAT_WELCOME,
            Self::Blueprint => BLUEPRINT_WELCOME,
        }
    }
}

/// Chat speaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    User,
    Assistant,
}

/// A web reference attached to an assistant answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub uri: String,
}

impl GroundingSource {
    /// Title for display, falling back to a fixed label when absent.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Untitled source")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: Sender,
    pub text: String,
    pub timestamp_ms: u64,
    #[serde(default)]
    pub is_error: bool,
    /// `None` means no sources apply; a present list is never empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<GroundingSource>>,
}

impl Message {
    fn new(sender: Sender, text: impl Into<String>, is_error: bool) -> Self {
        Self {
            id: MessageId::generate(),
            sender,
            text: text.into(),
            timestamp_ms: current_unix_timestamp_ms(),
            is_error,
            sources: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text, false)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Sender::Assistant, text, false)
    }

    /// Empty assistant message inserted before the first stream fragment
    /// arrives; the only message mutated after insertion.
    pub fn assistant_placeholder() -> Self {
        Self::new(Sender::Assistant, String::new(), false)
    }

    pub fn assistant_error(text: impl Into<String>) -> Self {
        Self::new(Sender::Assistant, text, true)
    }
}

/// In-place replacement for fields of one message. `None` leaves the field
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessagePatch {
    pub text: Option<String>,
    pub sources: Option<Vec<GroundingSource>>,
}

impl MessagePatch {
    pub fn apply_to(&self, message: &mut Message) {
        if let Some(text) = &self.text {
            message.text = text.clone();
        }
        if let Some(sources) = &self.sources {
            message.sources = Some(sources.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub title: String,
    pub mode: SessionMode,
    pub updated_at_ms: u64,
    pub messages: Vec<Message>,
}

impl Session {
    /// Creates a session seeded with the mode's welcome message.
    pub fn new(mode: SessionMode) -> Self {
        Self {
            id: SessionId::generate(),
            title: DEFAULT_SESSION_TITLE.to_string(),
            mode,
            updated_at_ms: current_unix_timestamp_ms(),
            messages: vec![Message::assistant(mode.welcome_text())],
        }
    }
}

/// Derives a session title from the first user message: up to
/// [`SESSION_TITLE_MAX_CHARS`] characters, ellipsized only when truncated.
pub fn derive_session_title(text: &str) -> String {
    let mut characters = text.chars();
    let head: String = characters.by_ref().take(SESSION_TITLE_MAX_CHARS).collect();
    if characters.next().is_none() {
        head
    } else {
        format!("{head}{TITLE_ELLIPSIS}")
    }
}

/// Display order for the session list: most recently touched first, newest
/// id first on a tie.
pub fn sort_by_recent_desc(left: &Session, right: &Session) -> Ordering {
    right
        .updated_at_ms
        .cmp(&left.updated_at_ms)
        .then_with(|| right.id.cmp(&left.id))
}

pub(crate) fn current_unix_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis() as u64)
}
