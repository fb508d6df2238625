pub mod error;
pub mod persist;
pub mod session;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use persist::{FileStateStore, STATE_DIRECTORY_NAME, STATE_FILE_NAME, StateStore};
pub use session::{
    DEFAULT_SESSION_TITLE, GroundingSource, Message, MessageId, MessagePatch, SESSION_TITLE_MAX_CHARS,
    Sender, Session, SessionId, SessionMode, derive_session_title, sort_by_recent_desc,
};
pub use store::{STATE_VERSION, SessionStore};
