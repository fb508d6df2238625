use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{Snafu, ensure};

use kismet_llm::{DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_CODEGEN_MODEL, GeminiConfig};

pub const SETTINGS_DIRECTORY_NAME: &str = "kismet";
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Prefix for environment overrides, e.g. `KISMET_API_KEY`.
pub const ENV_PREFIX: &str = "KISMET_";

/// Conventional credential variable honored when no prefixed key is set.
pub const API_KEY_ENV_FALLBACK: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub codegen_model: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            codegen_model: DEFAULT_CODEGEN_MODEL.to_string(),
        }
    }
}

impl AppSettings {
    fn normalized(mut self) -> Self {
        self.api_key = self.api_key.trim().to_string();
        self.base_url = self.base_url.trim().to_string();
        self.chat_model = self.chat_model.trim().to_string();
        self.codegen_model = self.codegen_model.trim().to_string();

        if self.base_url.is_empty() {
            self.base_url = DEFAULT_BASE_URL.to_string();
        }
        if self.chat_model.is_empty() {
            self.chat_model = DEFAULT_CHAT_MODEL.to_string();
        }
        if self.codegen_model.is_empty() {
            self.codegen_model = DEFAULT_CODEGEN_MODEL.to_string();
        }
        self
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Hard precondition checked before any interactive surface comes up.
    pub fn require_api_key(&self) -> Result<(), ConfigError> {
        ensure!(self.is_configured(), MissingApiKeySnafu);
        Ok(())
    }

    pub fn to_gemini_config(&self) -> GeminiConfig {
        let mut config = GeminiConfig::new(self.api_key.clone()).with_base_url(&self.base_url);
        config.chat_model = self.chat_model.clone();
        config.codegen_model = self.codegen_model.clone();
        config
    }
}

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display(
        "no Gemini API key configured; set {API_KEY_ENV_FALLBACK} (or {ENV_PREFIX}API_KEY) and restart"
    ))]
    MissingApiKey,
}

pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
        .unwrap_or_else(|| PathBuf::from(format!(".{SETTINGS_DIRECTORY_NAME}")))
        .join(SETTINGS_FILE_NAME)
}

pub fn load() -> AppSettings {
    load_from(&default_settings_path())
}

/// Layers defaults under the settings file under prefixed environment
/// variables. A malformed file logs a warning and falls back to defaults
/// rather than failing startup.
pub fn load_from(path: &Path) -> AppSettings {
    let figment = Figment::from(Serialized::defaults(AppSettings::default()))
        .merge(Json::file(path))
        .merge(Env::prefixed(ENV_PREFIX));

    let mut settings = match figment.extract::<AppSettings>() {
        Ok(settings) => settings.normalized(),
        Err(error) => {
            tracing::warn!(
                path = %path.display(),
                error = %error,
                "failed to load settings, using defaults"
            );
            AppSettings::default()
        }
    };

    if settings.api_key.is_empty()
        && let Ok(key) = std::env::var(API_KEY_ENV_FALLBACK)
    {
        settings.api_key = key.trim().to_string();
    }

    settings
}
