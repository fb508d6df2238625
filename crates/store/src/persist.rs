use std::path::{Path, PathBuf};

use snafu::ResultExt;

use crate::error::{
    ClearStateSnafu, CreateStateDirectorySnafu, ReadStateSnafu, ReplaceStateFileSnafu,
    StoreResult, WriteStateSnafu,
};

pub const STATE_DIRECTORY_NAME: &str = "kismet";
pub const STATE_FILE_NAME: &str = "sessions.json";

/// Single-key blob persistence substrate.
///
/// Models a key-value primitive holding one serialized payload under one
/// well-known key: read the current value, replace it whole, or remove it
/// entirely. There is no partial update.
pub trait StateStore: Send {
    fn read(&self) -> StoreResult<Option<String>>;
    fn write(&self, payload: &str) -> StoreResult<()>;
    fn clear(&self) -> StoreResult<()>;
}

/// File-backed substrate: the key is a path, the value is the file body.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Default location under the platform data directory.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .map(|path| path.join(STATE_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(format!(".{STATE_DIRECTORY_NAME}")))
            .join(STATE_FILE_NAME)
    }

    pub fn at_default() -> Self {
        Self::new(Self::default_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn read(&self) -> StoreResult<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }

        std::fs::read_to_string(&self.path)
            .map(Some)
            .context(ReadStateSnafu {
                stage: "read-state",
                path: display_path(&self.path),
            })
    }

    fn write(&self, payload: &str) -> StoreResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context(CreateStateDirectorySnafu {
                stage: "create-state-directory",
                path: display_path(parent),
            })?;
        }

        // Write through a sibling temp file so a crash mid-write leaves the
        // previous value in place.
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, payload).context(WriteStateSnafu {
            stage: "write-temporary-state-file",
            path: display_path(&temp_path),
        })?;

        std::fs::rename(&temp_path, &self.path).context(ReplaceStateFileSnafu {
            stage: "rename-temporary-state-file",
            from: display_path(&temp_path),
            to: display_path(&self.path),
        })
    }

    fn clear(&self) -> StoreResult<()> {
        if !self.path.exists() {
            return Ok(());
        }

        std::fs::remove_file(&self.path).context(ClearStateSnafu {
            stage: "clear-state",
            path: display_path(&self.path),
        })
    }
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}
