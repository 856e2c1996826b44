use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_SYSTEM_INSTRUCTION: &str =
    "You are Aura, an elite AI Automation Agent. Use tools when appropriate.";

/// Root configuration for aura.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub agent: AgentConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Check that the process has everything it needs to serve requests.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.api_key.trim().is_empty() {
            return Err(ConfigError::NoApiKey);
        }
        if self.agent.max_tool_iterations == 0 {
            return Err(ConfigError::Invalid(
                "maxToolIterations must be at least 1".to_string(),
            ));
        }
        if self.provider.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".to_string()));
        }
        Ok(())
    }

    /// Address the HTTP server binds to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Get API base URL, falling back to the public Gemini endpoint.
    pub fn api_base(&self) -> &str {
        self.provider.api_base.as_deref().unwrap_or(DEFAULT_API_BASE)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    pub api_key: String,
    pub api_base: Option<String>,
    pub model: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: None,
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    pub system_instruction: String,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Upper bound on model calls per chat exchange.
    pub max_tool_iterations: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            max_tokens: 8192,
            temperature: 0.7,
            max_tool_iterations: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            static_dir: ".".to_string(),
        }
    }
}

// ====== Config loading/saving ======

/// Load configuration from environment variables.
///
/// Priority:
/// 1. `AURA_CONFIG` env var: full JSON config
/// 2. Config file (`config_path` or `~/.aura/config.json`)
/// 3. Individual env vars, merged on top of whichever of the above applied
pub fn load_config_from_env(config_path: Option<&Path>) -> Config {
    let mut cfg = match std::env::var("AURA_CONFIG") {
        Ok(json) => match serde_json::from_str::<Config>(&json) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to parse AURA_CONFIG: {}", e);
                load_config(config_path)
            }
        },
        Err(_) => load_config(config_path),
    };

    apply_env_overrides(&mut cfg);
    cfg
}

/// Read an env var, treating unset and blank values alike.
fn env_value(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn apply_env_overrides(cfg: &mut Config) {
    // API_KEY wins over GEMINI_API_KEY
    for var in ["GEMINI_API_KEY", "API_KEY"] {
        if let Some(v) = env_value(var) {
            cfg.provider.api_key = v;
        }
    }
    if let Some(v) = env_value("GEMINI_API_BASE") {
        cfg.provider.api_base = Some(v);
    }
    if let Some(v) = env_value("AURA_MODEL") {
        cfg.provider.model = v;
    }
    if let Some(v) = env_value("AURA_HOST") {
        cfg.server.host = v;
    }
    if let Some(v) = env_value("AURA_PORT") {
        match v.parse() {
            Ok(port) => cfg.server.port = port,
            Err(_) => tracing::warn!("Ignoring invalid AURA_PORT: {}", v),
        }
    }
    if let Some(v) = env_value("AURA_STATIC_DIR") {
        cfg.server.static_dir = v;
    }
}

/// Get the default configuration file path.
pub fn get_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".aura")
        .join("config.json")
}

/// Load configuration from file or create default.
pub fn load_config(config_path: Option<&Path>) -> Config {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if path.exists() {
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Config>(&content) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to parse config from {}: {}", path.display(), e);
                    tracing::warn!("Using default configuration.");
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config from {}: {}", path.display(), e);
                tracing::warn!("Using default configuration.");
            }
        }
    }

    Config::default()
}

/// Save configuration to file.
pub fn save_config(config: &Config, config_path: Option<&Path>) -> Result<(), ConfigError> {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    }

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    Ok(())
}
