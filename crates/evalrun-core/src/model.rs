//! Model configurations and provider/model resolution.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Credential values shipped in sample configuration files.
const PLACEHOLDER_KEYS: &[&str] = &["your-anthropic-api-key-here", "your-openai-api-key-here"];

/// A named model configuration an operator can pick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    /// Alias, e.g. "gpt-4o" or "ollama/llama3.2:latest".
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Provider credential. Never serialized.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Declared capability tags, e.g. "openai" or "local".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl LlmConfig {
    /// Create a config with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: None,
            base_url: None,
            api_key: None,
            tags: Vec::new(),
        }
    }

    /// Builder method to set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Builder method to set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Builder method to set the credential. Placeholder values are dropped.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if !key.is_empty() && !PLACEHOLDER_KEYS.contains(&key.as_str()) {
            self.api_key = Some(key);
        }
        self
    }

    /// Builder method to add a capability tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Whether the model runs on a local Ollama instance.
    pub fn is_local(&self) -> bool {
        self.provider() == Provider::Ollama
    }

    /// Provider this configuration resolves to.
    pub fn provider(&self) -> Provider {
        classify_provider(&ProviderHints {
            name: &self.name,
            base_url: self.base_url.as_deref(),
            tags: &self.tags,
        })
    }

    /// Configurations offered when no configuration source is available.
    pub fn defaults() -> Vec<LlmConfig> {
        const OLLAMA_URL: &str = "http://localhost:11434/v1";
        vec![
            LlmConfig::new("ollama/deepseek-r1:1.5b")
                .with_model("deepseek-r1:1.5b")
                .with_base_url(OLLAMA_URL),
            LlmConfig::new("ollama/llama3.2:latest")
                .with_model("llama3.2:latest")
                .with_base_url(OLLAMA_URL),
            LlmConfig::new("ollama/gemma3:1b")
                .with_model("gemma3:1b")
                .with_base_url(OLLAMA_URL),
            LlmConfig::new("openai/gpt-4o")
                .with_model("gpt-4o")
                .with_base_url("https://api.openai.com/v1"),
        ]
    }
}

/// Model provider understood by the evaluation worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    Ollama,
    /// Any other provider named explicitly as `provider/model`.
    Other(String),
}

impl Provider {
    /// Parse a provider name as written in `provider/model`.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "openai" => Self::OpenAi,
            "ollama" => Self::Ollama,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured input for provider classification.
#[derive(Debug, Clone, Copy)]
pub struct ProviderHints<'a> {
    pub name: &'a str,
    pub base_url: Option<&'a str>,
    pub tags: &'a [String],
}

/// Classify a configuration into a provider.
///
/// Declared tags win, then the endpoint, then the alias prefix. Anything left
/// is assumed to be a local Ollama model.
pub fn classify_provider(hints: &ProviderHints<'_>) -> Provider {
    for tag in hints.tags {
        match tag.to_ascii_lowercase().as_str() {
            "openai" => return Provider::OpenAi,
            "ollama" | "local" => return Provider::Ollama,
            _ => {}
        }
    }

    if hints.base_url.is_some_and(|url| url.contains("openai.com")) {
        return Provider::OpenAi;
    }

    if hints.name.starts_with("openai") {
        return Provider::OpenAi;
    }

    Provider::Ollama
}

/// How a requested configuration string was turned into a provider/model pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The request was already `provider/model`.
    Explicit,
    /// Found in the configuration list.
    Alias,
    /// Last-resort substring matching on the requested string.
    Heuristic,
}

/// Provider/model pair passed to the worker.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModel {
    pub provider: Provider,
    pub model: String,
    pub resolution: Resolution,
    /// Credential carried by the matching alias, if any.
    pub api_key: Option<String>,
}

/// Resolve a requested model configuration. Never fails.
pub fn resolve_model(requested: &str, configs: &[LlmConfig]) -> ResolvedModel {
    if let Some((provider, model)) = requested.split_once('/') {
        return ResolvedModel {
            provider: Provider::from_name(provider),
            model: model.to_string(),
            resolution: Resolution::Explicit,
            api_key: None,
        };
    }

    if let Some(config) = configs.iter().find(|c| c.name == requested) {
        if let Some(model) = &config.model {
            return ResolvedModel {
                provider: config.provider(),
                model: model.clone(),
                resolution: Resolution::Alias,
                api_key: config.api_key.clone(),
            };
        }
    }

    // Fallback: guess from the requested string itself.
    let (provider, model) = if requested.contains("gpt") || requested.contains("openai") {
        let model = requested.strip_prefix("openai-").unwrap_or(requested);
        (Provider::OpenAi, model)
    } else {
        let model = requested.strip_prefix("ollama-").unwrap_or(requested);
        (Provider::Ollama, model)
    };

    ResolvedModel {
        provider,
        model: model.to_string(),
        resolution: Resolution::Heuristic,
        api_key: None,
    }
}
