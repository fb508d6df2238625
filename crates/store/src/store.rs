use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};

use crate::error::{
    DecodeStateSnafu, EncodeStateSnafu, StoreResult, UnsupportedStateVersionSnafu,
};
use crate::persist::StateStore;
use crate::session::{
    Message, MessageId, MessagePatch, Sender, Session, SessionId, SessionMode,
    current_unix_timestamp_ms, derive_session_title, sort_by_recent_desc,
};

/// Version tag on the persisted envelope. Readers reject other versions and
/// fall back to a cold start.
pub const STATE_VERSION: u32 = 1;

#[derive(Serialize)]
struct PersistedStateRef<'a> {
    version: u32,
    sessions: &'a [Session],
}

#[derive(Deserialize)]
struct PersistedState {
    version: u32,
    sessions: Vec<Session>,
}

/// Owner of all session and message data.
///
/// Every mutation is serialized through these entry points, and each
/// successful mutation of the session list re-serializes the whole list to
/// the backing substrate. Write failures are logged and swallowed; a stale
/// blob is preferable to taking the session down.
pub struct SessionStore {
    sessions: Vec<Session>,
    active_id: SessionId,
    active_mode: SessionMode,
    state: Box<dyn StateStore>,
}

impl SessionStore {
    /// Restores persisted sessions, or bootstraps one fresh default session
    /// when nothing usable is stored. Never surfaces a read error: corrupt
    /// state is a cold start, not a failure.
    pub fn load(state: Box<dyn StateStore>) -> Self {
        let restored = match Self::read_state(state.as_ref()) {
            Ok(Some(sessions)) if !sessions.is_empty() => Some(sessions),
            Ok(_) => None,
            Err(error) => {
                tracing::warn!(error = %error, "discarding unreadable session state");
                None
            }
        };

        match restored {
            Some(sessions) => {
                let active_id = sessions[0].id;
                let active_mode = sessions[0].mode;
                tracing::debug!(session_count = sessions.len(), "restored persisted sessions");
                Self {
                    sessions,
                    active_id,
                    active_mode,
                    state,
                }
            }
            None => {
                let session = Session::new(SessionMode::Chat);
                let store = Self {
                    active_id: session.id,
                    active_mode: session.mode,
                    sessions: vec![session],
                    state,
                };
                store.persist();
                store
            }
        }
    }

    fn read_state(state: &dyn StateStore) -> StoreResult<Option<Vec<Session>>> {
        let Some(payload) = state.read()? else {
            return Ok(None);
        };

        let persisted: PersistedState =
            serde_json::from_str(&payload).context(DecodeStateSnafu {
                stage: "decode-state",
            })?;
        ensure!(
            persisted.version == STATE_VERSION,
            UnsupportedStateVersionSnafu {
                stage: "check-state-version",
                found: persisted.version,
                supported: STATE_VERSION,
            }
        );

        Ok(Some(persisted.sessions))
    }

    /// Creates a session at the head of the list and makes it (and its
    /// mode) active.
    pub fn create_session(&mut self, mode: SessionMode) -> SessionId {
        let session = Session::new(mode);
        let id = session.id;
        self.sessions.insert(0, session);
        self.active_id = id;
        self.active_mode = mode;
        self.persist();
        id
    }

    /// Removes a session. Deleting the last session clears the persisted
    /// key before a fresh default session takes its place; deleting the
    /// active session activates the next one by recency.
    pub fn delete_session(&mut self, id: SessionId) {
        let Some(index) = self.sessions.iter().position(|session| session.id == id) else {
            return;
        };
        self.sessions.remove(index);
        self.persist();

        if self.sessions.is_empty() {
            let _ = self.create_session(SessionMode::Chat);
            return;
        }

        if self.active_id == id {
            let next_id = self.sessions_by_recency().first().map(|session| session.id);
            if let Some(next_id) = next_id {
                self.select_session(next_id);
            }
        }
    }

    /// Activates a session and synchronizes the active mode to it. Unknown
    /// ids are a no-op.
    pub fn select_session(&mut self, id: SessionId) {
        let Some(session) = self.sessions.iter().find(|session| session.id == id) else {
            return;
        };
        self.active_id = session.id;
        self.active_mode = session.mode;
    }

    /// Appends a message and bumps the session's last-modified stamp. The
    /// first user turn after the seeded welcome overwrites the title.
    pub fn append_message(&mut self, session_id: SessionId, message: Message) {
        let Some(session) = self
            .sessions
            .iter_mut()
            .find(|session| session.id == session_id)
        else {
            return;
        };

        if session.messages.len() == 1 && session.messages[0].sender == Sender::Assistant {
            session.title = derive_session_title(&message.text);
        }

        session.updated_at_ms = current_unix_timestamp_ms();
        session.messages.push(message);
        self.persist();
    }

    /// Patches one message in place. A full scan over the message list is
    /// fine at the session sizes this store holds.
    pub fn update_message(
        &mut self,
        session_id: SessionId,
        message_id: MessageId,
        patch: MessagePatch,
    ) {
        let Some(session) = self
            .sessions
            .iter_mut()
            .find(|session| session.id == session_id)
        else {
            return;
        };

        for message in &mut session.messages {
            if message.id == message_id {
                patch.apply_to(message);
            }
        }
        self.persist();
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|session| session.id == id)
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.session(self.active_id)
    }

    pub fn active_session_id(&self) -> SessionId {
        self.active_id
    }

    pub fn active_mode(&self) -> SessionMode {
        self.active_mode
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Display order, recomputed on every call rather than persisted.
    pub fn sessions_by_recency(&self) -> Vec<&Session> {
        let mut sessions: Vec<&Session> = self.sessions.iter().collect();
        sessions.sort_by(|left, right| sort_by_recent_desc(left, right));
        sessions
    }

    fn persist(&self) {
        if let Err(error) = self.write_state() {
            tracing::error!(error = %error, "failed to persist session state");
        }
    }

    fn write_state(&self) -> StoreResult<()> {
        if self.sessions.is_empty() {
            return self.state.clear();
        }

        let envelope = PersistedStateRef {
            version: STATE_VERSION,
            sessions: &self.sessions,
        };
        let payload = serde_json::to_string(&envelope).context(EncodeStateSnafu {
            stage: "encode-state",
        })?;
        self.state.write(&payload)
    }
}
