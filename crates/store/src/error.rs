use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    #[snafu(display("failed to create session state directory at {path}"))]
    CreateStateDirectory {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to read session state from {path}"))]
    ReadState {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to write session state to {path}"))]
    WriteState {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to replace session state file from {from} to {to}"))]
    ReplaceStateFile {
        stage: &'static str,
        from: String,
        to: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to remove session state at {path}"))]
    ClearState {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to encode session state on `{stage}`, {source}"))]
    EncodeState {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to decode session state on `{stage}`, {source}"))]
    DecodeState {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("unsupported session state version {found}, supported version is {supported}"))]
    UnsupportedStateVersion {
        stage: &'static str,
        found: u32,
        supported: u32,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;
