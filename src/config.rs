//! Engine configuration: YAML file shape, resolved config with builder
//! and environment fallback, and the model → provider registry.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::accumulator::{TEMPORARY_MESSAGE_LIMIT, UPLOAD_TIMEOUT};
use crate::error::ConfigError;

/// Default chat/memory model.
const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Default timezone string.
const DEFAULT_TIMEZONE: &str = "UTC";
/// Default persona name.
const DEFAULT_PERSONA: &str = "chill_buddy";
/// Default tool-loop iteration budget.
const DEFAULT_MAX_TOOL_ITERATIONS: usize = 10;
/// Cloud screenshot count that triggers the GC.
pub const MAXIMUM_NUM_IMAGES_IN_CLOUD: usize = 100;

/// Recognized options of the YAML agent configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentFileConfig {
    /// Deployment name.
    pub agent_name: String,
    /// Chat model name.
    pub model_name: String,
    /// Whether the deployment runs as a screen monitor.
    #[serde(default)]
    pub is_screen_monitor: bool,
    /// Provider endpoint override.
    #[serde(default)]
    pub model_endpoint: Option<String>,
    /// Inline API key (database-stored keys take precedence).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Free-form generation parameters passed through to the provider.
    #[serde(default)]
    pub generation_config: Option<HashMap<String, serde_yaml::Value>>,
    /// Memory model name (defaults to the chat model when allow-listed).
    #[serde(default)]
    pub memory_model_name: Option<String>,
    /// Ready-observation count that triggers a flush.
    #[serde(default)]
    pub temporary_message_limit: Option<usize>,
    /// Per-placeholder upload timeout in seconds.
    #[serde(default)]
    pub upload_timeout_seconds: Option<u64>,
    /// Dispatch flushes directly to all six memory agents instead of
    /// routing through the meta-memory agent.
    #[serde(default)]
    pub skip_meta_memory_manager: Option<bool>,
    /// Include recent screenshots in chat prompts.
    #[serde(default)]
    pub include_recent_screenshots: Option<bool>,
    /// Timezone string, e.g. `"Asia/Shanghai (UTC+8:00)"`.
    #[serde(default)]
    pub timezone: Option<String>,
    /// Active persona name.
    #[serde(default)]
    pub persona: Option<String>,
}

impl AgentFileConfig {
    /// Loads and parses the YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&raw)?;
        if config.agent_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "agent_name must be non-empty".to_string(),
            });
        }
        Ok(config)
    }
}

/// Resolved engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deployment name.
    pub agent_name: String,
    /// Chat model name.
    pub model_name: String,
    /// Memory model name.
    pub memory_model_name: String,
    /// Provider endpoint override.
    pub model_endpoint: Option<String>,
    /// Inline API key from config.
    pub api_key: Option<String>,
    /// Whether the deployment runs as a screen monitor.
    pub is_screen_monitor: bool,
    /// Include recent screenshots in chat prompts.
    pub include_recent_screenshots: bool,
    /// Dispatch flushes directly to all six memory agents.
    pub skip_meta_memory_manager: bool,
    /// Ready-observation count that triggers a flush.
    pub temporary_message_limit: usize,
    /// Per-placeholder upload timeout.
    pub upload_timeout: Duration,
    /// Timezone string.
    pub timezone_str: String,
    /// Active persona name.
    pub persona: String,
    /// Tool-loop iteration budget per agent dispatch.
    pub max_tool_iterations: usize,
    /// Cloud screenshot count that triggers the GC.
    pub maximum_cloud_images: usize,
}

impl EngineConfig {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Resolves a full config from the YAML file shape.
    #[must_use]
    pub fn from_file_config(file: &AgentFileConfig) -> Self {
        let mut builder = Self::builder()
            .agent_name(&file.agent_name)
            .model_name(&file.model_name)
            .is_screen_monitor(file.is_screen_monitor);
        if let Some(memory_model) = &file.memory_model_name {
            builder = builder.memory_model_name(memory_model);
        }
        if let Some(endpoint) = &file.model_endpoint {
            builder = builder.model_endpoint(endpoint);
        }
        if let Some(key) = &file.api_key {
            builder = builder.api_key(key);
        }
        if let Some(limit) = file.temporary_message_limit {
            builder = builder.temporary_message_limit(limit);
        }
        if let Some(seconds) = file.upload_timeout_seconds {
            builder = builder.upload_timeout(Duration::from_secs(seconds));
        }
        if let Some(skip) = file.skip_meta_memory_manager {
            builder = builder.skip_meta_memory_manager(skip);
        }
        if let Some(include) = file.include_recent_screenshots {
            builder = builder.include_recent_screenshots(include);
        }
        if let Some(timezone) = &file.timezone {
            builder = builder.timezone(timezone);
        }
        if let Some(persona) = &file.persona {
            builder = builder.persona(persona);
        }
        builder.build()
    }
}

/// Builder for [`EngineConfig`]. Unset fields resolve to defaults.
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    agent_name: Option<String>,
    model_name: Option<String>,
    memory_model_name: Option<String>,
    model_endpoint: Option<String>,
    api_key: Option<String>,
    is_screen_monitor: Option<bool>,
    include_recent_screenshots: Option<bool>,
    skip_meta_memory_manager: Option<bool>,
    temporary_message_limit: Option<usize>,
    upload_timeout: Option<Duration>,
    timezone: Option<String>,
    persona: Option<String>,
    max_tool_iterations: Option<usize>,
    maximum_cloud_images: Option<usize>,
}

impl EngineConfigBuilder {
    /// Sets the deployment name.
    #[must_use]
    pub fn agent_name(mut self, name: &str) -> Self {
        self.agent_name = Some(name.to_string());
        self
    }

    /// Sets the chat model.
    #[must_use]
    pub fn model_name(mut self, name: &str) -> Self {
        self.model_name = Some(name.to_string());
        self
    }

    /// Sets the memory model.
    #[must_use]
    pub fn memory_model_name(mut self, name: &str) -> Self {
        self.memory_model_name = Some(name.to_string());
        self
    }

    /// Sets the provider endpoint override.
    #[must_use]
    pub fn model_endpoint(mut self, endpoint: &str) -> Self {
        self.model_endpoint = Some(endpoint.to_string());
        self
    }

    /// Sets the inline API key.
    #[must_use]
    pub fn api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    /// Sets screen-monitor mode.
    #[must_use]
    pub const fn is_screen_monitor(mut self, value: bool) -> Self {
        self.is_screen_monitor = Some(value);
        self
    }

    /// Sets whether chat prompts include recent screenshots.
    #[must_use]
    pub const fn include_recent_screenshots(mut self, value: bool) -> Self {
        self.include_recent_screenshots = Some(value);
        self
    }

    /// Sets direct fan-out dispatch (skipping the meta-memory agent).
    #[must_use]
    pub const fn skip_meta_memory_manager(mut self, value: bool) -> Self {
        self.skip_meta_memory_manager = Some(value);
        self
    }

    /// Sets the flush threshold.
    #[must_use]
    pub const fn temporary_message_limit(mut self, limit: usize) -> Self {
        self.temporary_message_limit = Some(limit);
        self
    }

    /// Sets the per-placeholder upload timeout.
    #[must_use]
    pub const fn upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = Some(timeout);
        self
    }

    /// Sets the timezone string.
    #[must_use]
    pub fn timezone(mut self, timezone: &str) -> Self {
        self.timezone = Some(timezone.to_string());
        self
    }

    /// Sets the persona name.
    #[must_use]
    pub fn persona(mut self, persona: &str) -> Self {
        self.persona = Some(persona.to_string());
        self
    }

    /// Sets the tool-loop iteration budget.
    #[must_use]
    pub const fn max_tool_iterations(mut self, n: usize) -> Self {
        self.max_tool_iterations = Some(n);
        self
    }

    /// Sets the cloud screenshot count that triggers the GC.
    #[must_use]
    pub const fn maximum_cloud_images(mut self, n: usize) -> Self {
        self.maximum_cloud_images = Some(n);
        self
    }

    /// Builds the resolved config, filling defaults.
    #[must_use]
    pub fn build(self) -> EngineConfig {
        let model_name = self.model_name.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let memory_model_name = self.memory_model_name.unwrap_or_else(|| {
            if is_allowed_memory_model(&model_name) {
                model_name.clone()
            } else {
                DEFAULT_MODEL.to_string()
            }
        });
        EngineConfig {
            agent_name: self.agent_name.unwrap_or_else(|| "mirix".to_string()),
            model_name,
            memory_model_name,
            model_endpoint: self.model_endpoint,
            api_key: self.api_key,
            is_screen_monitor: self.is_screen_monitor.unwrap_or(false),
            include_recent_screenshots: self.include_recent_screenshots.unwrap_or(false),
            skip_meta_memory_manager: self.skip_meta_memory_manager.unwrap_or(false),
            temporary_message_limit: self
                .temporary_message_limit
                .unwrap_or(TEMPORARY_MESSAGE_LIMIT),
            upload_timeout: self.upload_timeout.unwrap_or(UPLOAD_TIMEOUT),
            timezone_str: self.timezone.unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
            persona: self.persona.unwrap_or_else(|| DEFAULT_PERSONA.to_string()),
            max_tool_iterations: self
                .max_tool_iterations
                .unwrap_or(DEFAULT_MAX_TOOL_ITERATIONS),
            maximum_cloud_images: self
                .maximum_cloud_images
                .unwrap_or(MAXIMUM_NUM_IMAGES_IN_CLOUD),
        }
    }
}

// ---------------------------------------------------------------------------
// Model registry
// ---------------------------------------------------------------------------

/// LLM providers the engine can hold keys for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelProvider {
    /// OpenAI-compatible endpoints.
    OpenAi,
    /// Google Gemini.
    Gemini,
    /// Anthropic.
    Anthropic,
}

impl ModelProvider {
    /// Key name used in the provider-key table.
    #[must_use]
    pub const fn key_name(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Anthropic => "anthropic",
        }
    }

    /// Environment variable consulted when no stored key exists.
    #[must_use]
    pub const fn env_var(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    /// Parses a provider key name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "gemini" | "google" | "google_ai" => Some(Self::Gemini),
            "anthropic" => Some(Self::Anthropic),
            _ => None,
        }
    }
}

/// Maps a model name to the provider whose key it needs.
#[must_use]
pub fn provider_for_model(model: &str) -> Option<ModelProvider> {
    let model = model.to_lowercase();
    if model.starts_with("gpt-") || model.starts_with("o1") || model.starts_with("o3") {
        Some(ModelProvider::OpenAi)
    } else if model.starts_with("gemini-") {
        Some(ModelProvider::Gemini)
    } else if model.starts_with("claude-") {
        Some(ModelProvider::Anthropic)
    } else {
        None
    }
}

/// Memory models are restricted to this allow-list.
pub const MEMORY_MODEL_ALLOWLIST: &[&str] = &[
    "gpt-4o-mini",
    "gpt-4o",
    "gemini-2.0-flash",
    "gemini-2.0-flash-lite",
    "gemini-1.5-pro",
    "claude-3-5-sonnet-20241022",
];

/// Returns `true` when the model may serve as the memory model.
#[must_use]
pub fn is_allowed_memory_model(model: &str) -> bool {
    MEMORY_MODEL_ALLOWLIST.contains(&model)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = EngineConfig::builder().build();
        assert_eq!(config.model_name, DEFAULT_MODEL);
        assert_eq!(config.memory_model_name, DEFAULT_MODEL);
        assert_eq!(config.temporary_message_limit, TEMPORARY_MESSAGE_LIMIT);
        assert_eq!(config.upload_timeout, UPLOAD_TIMEOUT);
        assert!(!config.skip_meta_memory_manager);
    }

    #[test]
    fn test_memory_model_falls_back_when_chat_model_not_allowed() {
        let config = EngineConfig::builder().model_name("o3-mini").build();
        assert_eq!(config.memory_model_name, DEFAULT_MODEL);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let yaml = "
agent_name: screen-agent
model_name: gemini-2.0-flash
is_screen_monitor: true
temporary_message_limit: 5
skip_meta_memory_manager: true
timezone: \"Asia/Shanghai (UTC+8:00)\"
";
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let path = dir.path().join("agent.yaml");
        std::fs::write(&path, yaml).unwrap_or_else(|e| panic!("write: {e}"));

        let file = AgentFileConfig::load(&path).unwrap_or_else(|e| panic!("load: {e}"));
        let config = EngineConfig::from_file_config(&file);
        assert_eq!(config.agent_name, "screen-agent");
        assert_eq!(config.model_name, "gemini-2.0-flash");
        assert_eq!(config.memory_model_name, "gemini-2.0-flash");
        assert!(config.is_screen_monitor);
        assert!(config.skip_meta_memory_manager);
        assert_eq!(config.temporary_message_limit, 5);
        assert!(config.timezone_str.starts_with("Asia/Shanghai"));
    }

    #[test]
    fn test_unknown_yaml_field_rejected() {
        let yaml = "agent_name: a\nmodel_name: gpt-4o\nmystery_flag: true\n";
        let parsed: Result<AgentFileConfig, _> = serde_yaml::from_str(yaml);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_provider_registry() {
        assert_eq!(provider_for_model("gpt-4o"), Some(ModelProvider::OpenAi));
        assert_eq!(
            provider_for_model("gemini-2.0-flash"),
            Some(ModelProvider::Gemini)
        );
        assert_eq!(
            provider_for_model("claude-3-5-sonnet-20241022"),
            Some(ModelProvider::Anthropic)
        );
        assert_eq!(provider_for_model("mystery-1"), None);
    }

    #[test]
    fn test_memory_model_allowlist() {
        assert!(is_allowed_memory_model("gpt-4o-mini"));
        assert!(!is_allowed_memory_model("o3-mini"));
    }
}
