use crate::core::ChatError;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

include!(concat!(env!("OUT_DIR"), "/config_embedded.rs"));

/// Config file looked up in the working directory when no path is given.
pub const CONFIG_FILE: &str = "config.toml";

/// Environment variables holding the Gemini API key, in order of precedence.
pub const API_KEY_VARS: [&str; 2] = ["GOOGLE_API_KEY", "GEMINI_API_KEY"];

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub model: String,
    pub api_base: String,
    pub stream: bool,
    pub context_window: u32,
    pub max_turns: u32,
    pub exit_keywords: Vec<String>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub log_file: Option<PathBuf>,
    /// Resolved from the environment at startup, never read from the file.
    #[serde(skip)]
    pub api_key: Option<ApiKey>,
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("Invalid default config")
    }
}

impl Config {
    /// Loads the config from `path`, or from `config.toml` in the working
    /// directory, falling back to the embedded default when neither exists.
    ///
    /// Keys missing from the file keep their default values.
    pub fn load(path: Option<&Path>) -> Result<Self, ChatError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(CONFIG_FILE).exists() => Self::from_file(Path::new(CONFIG_FILE))?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ChatError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            ChatError::Configuration(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml(&contents)
    }

    /// Parses `contents` layered over the embedded default config.
    pub fn from_toml(contents: &str) -> Result<Self, ChatError> {
        let parse = |source: &str| {
            source.parse::<toml::Table>().map_err(|e| {
                ChatError::Configuration(format!("Failed to parse config file: {e}"))
            })
        };
        let mut table = parse(DEFAULT_CONFIG)?;
        table.extend(parse(contents)?);

        toml::Value::Table(table)
            .try_into()
            .map_err(|e| ChatError::Configuration(format!("Invalid config: {e}")))
    }

    pub fn validate(&self) -> Result<(), ChatError> {
        if self.model().is_empty() {
            return Err(ChatError::Configuration("model must not be empty".into()));
        }
        if self.max_turns == 0 {
            return Err(ChatError::Configuration(
                "max_turns must be at least 1".into(),
            ));
        }
        if self.exit_keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(ChatError::Configuration(
                "exit_keywords must not contain blank entries".into(),
            ));
        }
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ChatError::Configuration(format!(
                    "temperature must be between 0.0 and 2.0, got {temperature}"
                )));
            }
        }
        Ok(())
    }

    /// The model name without any `models/` resource prefix.
    pub fn model(&self) -> &str {
        let model = self.model.trim();
        model.strip_prefix("models/").unwrap_or(model)
    }

    pub fn update_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    /// Whole-line, ASCII case-insensitive match against the exit keywords.
    pub fn is_exit_keyword(&self, text: &str) -> bool {
        let text = text.trim();
        self.exit_keywords
            .iter()
            .any(|keyword| keyword.trim().eq_ignore_ascii_case(text))
    }
}

/// A non-empty Gemini API key.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Result<Self, ChatError> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            return Err(ChatError::Configuration("API key must not be empty".into()));
        }
        Ok(Self(key))
    }

    /// Reads the key from `.env` or the process environment.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| {
            dotenv::var(name)
                .or_else(|_| std::env::var(name))
                .ok()
        })
    }

    /// Returns the first usable key among [`API_KEY_VARS`]; blank values are skipped.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        API_KEY_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .find_map(|value| Self::new(value).ok())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}
