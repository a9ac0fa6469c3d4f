//! Configuration system (layered: code > env > config file > defaults).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SluiceError;
use crate::stream::inline_tags::DEFAULT_REASONING_TAGS;
use crate::types::Backend;

/// Global default config (lazy-initialized from file and env).
static DEFAULT_CONFIG: OnceLock<SluiceConfig> = OnceLock::new();

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Settings handed to every decoder of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Inline tag names treated as reasoning delimiters.
    pub reasoning_tags: Vec<String>,
    /// Log the first few raw frames of each stream at debug level.
    pub debug_frames: bool,
}

impl DecoderConfig {
    /// Number of raw frames logged when `debug_frames` is on.
    pub const DEBUG_FRAME_LIMIT: usize = 5;
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            reasoning_tags: DEFAULT_REASONING_TAGS.map(String::from).to_vec(),
            debug_frames: false,
        }
    }
}

/// Layered configuration for sluice.
///
/// Resolution order, lowest first:
/// 1. Built-in defaults
/// 2. `~/.sluice/config.toml`
/// 3. Environment (`.env` is loaded first when present)
/// 4. Values set in code
///
/// ```toml
/// reasoning_tags = ["think", "reflection"]
/// debug_frames = false
///
/// [base_urls]
/// openai-chat = "http://localhost:11434/v1"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SluiceConfig {
    /// Base URL overrides keyed by backend name.
    pub base_urls: BTreeMap<String, String>,
    pub reasoning_tags: Vec<String>,
    pub debug_frames: bool,
}

impl Default for SluiceConfig {
    fn default() -> Self {
        let decoder = DecoderConfig::default();
        Self {
            base_urls: BTreeMap::new(),
            reasoning_tags: decoder.reasoning_tags,
            debug_frames: decoder.debug_frames,
        }
    }
}

impl SluiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, then the config file, then the environment.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = match Self::load_file(&Self::default_path()) {
            Ok(Some(config)) => config,
            Ok(None) => Self::new(),
            Err(err) => {
                warn!(error = %err, "Ignoring unreadable sluice config file");
                Self::new()
            }
        };
        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    /// Get (or create) the global default config.
    pub fn global() -> &'static SluiceConfig {
        DEFAULT_CONFIG.get_or_init(Self::from_env)
    }

    /// Default config file path (`~/.sluice/config.toml`).
    pub fn default_path() -> PathBuf {
        directories::UserDirs::new()
            .map(|dirs| dirs.home_dir().join(".sluice"))
            .unwrap_or_else(|| PathBuf::from(".sluice"))
            .join("config.toml")
    }

    /// Read a config file. A missing file is `Ok(None)`.
    pub fn load_file(path: &Path) -> Result<Option<Self>, SluiceError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(SluiceError::Io(err)),
        };
        let config: Self = toml::from_str(&raw)?;
        Ok(Some(config))
    }

    /// Overlay environment variables read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let url_mappings = [
            ("ANTHROPIC_BASE_URL", Backend::Anthropic),
            ("OPENAI_BASE_URL", Backend::OpenAiResponses),
            ("OPENAI_COMPAT_BASE_URL", Backend::OpenAiChat),
        ];
        for (env_var, backend) in url_mappings {
            if let Some(url) = lookup(env_var).filter(|url| !url.trim().is_empty()) {
                self.set_base_url(backend, url);
            }
        }

        if let Some(tags) = lookup("SLUICE_REASONING_TAGS") {
            let tags: Vec<String> = tags
                .split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect();
            if !tags.is_empty() {
                self.reasoning_tags = tags;
            }
        }

        if let Some(flag) = lookup("SLUICE_DEBUG") {
            self.debug_frames = matches!(flag.as_str(), "1" | "true" | "TRUE");
        }
    }

    pub fn set_base_url(&mut self, backend: Backend, url: impl Into<String>) {
        self.base_urls.insert(backend.to_string(), url.into());
    }

    /// Base URL for `backend`, without a trailing slash.
    pub fn base_url(&self, backend: Backend) -> String {
        let url = self
            .base_urls
            .get(&backend.to_string())
            .map(String::as_str)
            .unwrap_or(match backend {
                Backend::Anthropic => ANTHROPIC_BASE_URL,
                Backend::OpenAiResponses | Backend::OpenAiChat => OPENAI_BASE_URL,
            });
        url.trim_end_matches('/').to_string()
    }

    pub fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig {
            reasoning_tags: self.reasoning_tags.clone(),
            debug_frames: self.debug_frames,
        }
    }
}
