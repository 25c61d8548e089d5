//! Configuration system (layered: code > env > config file > defaults).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ColloquyError;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_INDICATOR_DELAY_MS: u64 = 500;
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Runtime configuration for colloquy.
///
/// Resolution order, highest first:
/// 1. Setters called from code
/// 2. Environment (`COLLOQUY_*`, with `OPENAI_*` fallbacks for key and URL)
/// 3. `<data_dir>/config.toml`
/// 4. Built-in defaults
#[derive(Clone, PartialEq)]
pub struct ColloquyConfig {
    api_key: Option<String>,
    base_url: Option<String>,
    model: String,
    system_prompt: Option<String>,
    data_dir: PathBuf,
    indicator_delay_ms: u64,
    title_generation: bool,
}

impl std::fmt::Debug for ColloquyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColloquyConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("system_prompt", &self.system_prompt)
            .field("data_dir", &self.data_dir)
            .field("indicator_delay_ms", &self.indicator_delay_ms)
            .field("title_generation", &self.title_generation)
            .finish()
    }
}

impl Default for ColloquyConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: DEFAULT_MODEL.to_string(),
            system_prompt: None,
            data_dir: default_data_dir(),
            indicator_delay_ms: DEFAULT_INDICATOR_DELAY_MS,
            title_generation: true,
        }
    }
}

/// On-disk shape of `config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    system_prompt: Option<String>,
    indicator_delay_ms: Option<u64>,
    title_generation: Option<bool>,
}

impl ColloquyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment over defaults; the config file is not read.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = Self::new();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Full layered load: defaults, then `<data_dir>/config.toml`, then environment.
    pub fn load() -> Result<Self, ColloquyError> {
        let _ = dotenvy::dotenv();
        Self::load_with(|key| std::env::var(key).ok())
    }

    fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self, ColloquyError> {
        let mut config = Self::new();
        if let Some(dir) = non_blank(env("COLLOQUY_DATA_DIR")) {
            config.data_dir = PathBuf::from(dir);
        }
        let path = config.data_dir.join(CONFIG_FILE_NAME);
        if let Some(file) = read_file_config(&path)? {
            config.apply_file(file);
        }
        config.apply_env(env);
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(key) = non_blank(file.api_key) {
            self.api_key = Some(key);
        }
        if let Some(url) = non_blank(file.base_url) {
            self.base_url = Some(url);
        }
        if let Some(model) = non_blank(file.model) {
            self.model = model;
        }
        if let Some(prompt) = non_blank(file.system_prompt) {
            self.system_prompt = Some(prompt);
        }
        if let Some(delay) = file.indicator_delay_ms {
            self.indicator_delay_ms = delay;
        }
        if let Some(enabled) = file.title_generation {
            self.title_generation = enabled;
        }
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        let first = |keys: &[&str]| keys.iter().find_map(|k| non_blank(env(*k)));

        if let Some(key) = first(&["COLLOQUY_API_KEY", "OPENAI_API_KEY"]) {
            self.api_key = Some(key);
        }
        if let Some(url) = first(&["COLLOQUY_BASE_URL", "OPENAI_BASE_URL"]) {
            self.base_url = Some(url);
        }
        if let Some(model) = first(&["COLLOQUY_MODEL"]) {
            self.model = model;
        }
        if let Some(prompt) = first(&["COLLOQUY_SYSTEM_PROMPT"]) {
            self.system_prompt = Some(prompt);
        }
        if let Some(dir) = first(&["COLLOQUY_DATA_DIR"]) {
            self.data_dir = PathBuf::from(dir);
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_indicator_delay(mut self, delay: Duration) -> Self {
        self.indicator_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_title_generation(mut self, enabled: bool) -> Self {
        self.title_generation = enabled;
        self
    }

    pub fn api_key(&self) -> Option<String> {
        self.api_key.clone()
    }

    pub fn base_url(&self) -> Option<String> {
        self.base_url.clone()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Default system prompt for sessions that do not carry their own.
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory holding one JSON file per session.
    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    pub fn indicator_delay(&self) -> Duration {
        Duration::from_millis(self.indicator_delay_ms)
    }

    pub fn title_generation(&self) -> bool {
        self.title_generation
    }
}

fn read_file_config(path: &Path) -> Result<Option<FileConfig>, ColloquyError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| ColloquyError::Configuration(format!("{}: {e}", path.display())))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn default_data_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".colloquy"))
        .unwrap_or_else(|| PathBuf::from(".colloquy"))
}
