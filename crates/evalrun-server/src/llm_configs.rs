//! Loading named model configurations from the operator's TOML file.
//!
//! Only `[llm.<name>]` sections are read; everything else in the file belongs
//! to the worker. Dotted names such as `[llm.gpt-4.1]` are split into nested
//! tables by TOML and are joined back into one name here.

use std::collections::BTreeMap;
use std::path::Path;

use evalrun_core::LlmConfig;
use serde::Deserialize;
use tracing::{debug, warn};

const ENTRY_KEYS: &[&str] = &["model", "base_url", "api_key", "tags"];

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    llm: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmEntry {
    model: Option<String>,
    base_url: Option<String>,
    api_key: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

impl LlmEntry {
    fn into_config(self, name: String) -> LlmConfig {
        let mut config = LlmConfig::new(name);
        if let Some(model) = self.model {
            config = config.with_model(model);
        }
        if let Some(url) = self.base_url {
            config = config.with_base_url(url);
        }
        if let Some(key) = self.api_key {
            config = config.with_api_key(key);
        }
        for tag in self.tags {
            config = config.with_tag(tag);
        }
        config
    }
}

/// Parse the `[llm.*]` sections of a configuration file.
pub fn parse_llm_configs(text: &str) -> Result<Vec<LlmConfig>, toml::de::Error> {
    let file: ConfigFile = toml::from_str(text)?;
    let mut configs = Vec::new();
    for (name, value) in file.llm {
        collect(name, value, &mut configs)?;
    }
    Ok(configs)
}

fn collect(name: String, value: toml::Value, out: &mut Vec<LlmConfig>) -> Result<(), toml::de::Error> {
    let toml::Value::Table(table) = value else {
        debug!(name = %name, "Ignoring non-table llm entry");
        return Ok(());
    };

    let is_entry = table.is_empty() || ENTRY_KEYS.iter().any(|key| table.contains_key(*key));
    if is_entry {
        let entry: LlmEntry = toml::Value::Table(table).try_into()?;
        out.push(entry.into_config(name));
        return Ok(());
    }

    for (suffix, nested) in table {
        collect(format!("{name}.{suffix}"), nested, out)?;
    }
    Ok(())
}

/// Load configurations from `path`. Falls back to [`LlmConfig::defaults`]
/// when no path is set, the file cannot be read or parsed, or it defines no
/// configurations.
pub async fn load_llm_configs(path: Option<&Path>) -> Vec<LlmConfig> {
    let Some(path) = path else {
        return LlmConfig::defaults();
    };

    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Model config unavailable, using defaults");
            return LlmConfig::defaults();
        }
    };

    match parse_llm_configs(&text) {
        Ok(configs) if !configs.is_empty() => configs,
        Ok(_) => {
            warn!(path = %path.display(), "Model config defines no [llm] sections, using defaults");
            LlmConfig::defaults()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Malformed model config, using defaults");
            LlmConfig::defaults()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalrun_core::Provider;

    const SAMPLE: &str = r#"
[core]
workspace_base = "./workspace"

[llm.gpt-4o]
model = "gpt-4o"
base_url = "https://api.openai.com/v1"
api_key = "your-openai-api-key-here"

[llm.gpt-4.1]
model = "gpt-4.1"
api_key = "sk-live"
tags = ["openai"]

[llm."ollama/llama3.2:latest"]
model = "llama3.2:latest"
base_url = "http://localhost:11434/v1"
"#;

    #[test]
    fn test_parse_sections() {
        let configs = parse_llm_configs(SAMPLE).unwrap();
        let names: Vec<_> = configs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["gpt-4.1", "gpt-4o", "ollama/llama3.2:latest"]);

        let gpt41 = &configs[0];
        assert_eq!(gpt41.model.as_deref(), Some("gpt-4.1"));
        assert_eq!(gpt41.api_key.as_deref(), Some("sk-live"));
        assert_eq!(gpt41.provider(), Provider::OpenAi);

        // Placeholder credential dropped.
        assert!(configs[1].api_key.is_none());
        assert!(configs[2].is_local());
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let configs = load_llm_configs(Some(&dir.path().join("config.toml"))).await;
        assert_eq!(configs, LlmConfig::defaults());
        assert_eq!(load_llm_configs(None).await.len(), 4);
    }

    #[tokio::test]
    async fn test_file_without_llm_sections_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[core]\nx = 1\n").unwrap();
        assert_eq!(load_llm_configs(Some(&path)).await, LlmConfig::defaults());
    }
}
