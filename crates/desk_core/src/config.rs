use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const CONFIG_FILE_PATH: &str = "desk.toml";
const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_LOCAL_LLM_URL: &str = "http://localhost:11434";

/// LLM provider the backend should route the conversation through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAi,
    Groq,
    OpenRouter,
    Local,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Groq => "groq",
            Self::OpenRouter => "openrouter",
            Self::Local => "local",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Groq => "Groq",
            Self::OpenRouter => "OpenRouter",
            Self::Local => "Local (Ollama)",
        }
    }

    /// Environment variable holding the credential for this provider.
    ///
    /// The local provider has no key; the backend expects its base URL instead.
    fn credential_env_var(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Groq => "GROQ_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
            Self::Local => "LOCAL_LLM_URL",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "groq" => Ok(Self::Groq),
            "openrouter" => Ok(Self::OpenRouter),
            "local" | "ollama" => Ok(Self::Local),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskConfig {
    pub base_url: String,
    pub provider: Provider,
    pub model: Option<String>,
    pub api_key: Option<String>,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            provider: Provider::default(),
            model: None,
            api_key: None,
        }
    }
}

impl DeskConfig {
    /// Defaults, then `desk.toml` if present, then environment variables.
    pub fn new() -> Self {
        let mut config = Self::from_file(Path::new(CONFIG_FILE_PATH));
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    pub fn from_file(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                log::warn!("Failed to read {}: {}", path.display(), err);
                return Self::default();
            }
        };

        match toml::from_str::<DeskConfig>(&content) {
            Ok(config) => {
                log::debug!("Loaded config from {}", path.display());
                config
            }
            Err(err) => {
                log::warn!("Failed to parse {}: {}", path.display(), err);
                Self::default()
            }
        }
    }

    /// Apply overrides from a key lookup (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(base_url) = lookup("DESK_BASE_URL") {
            self.base_url = base_url;
        }
        if let Some(provider) = lookup("DESK_PROVIDER") {
            match provider.parse() {
                Ok(provider) => self.provider = provider,
                Err(err) => log::warn!("Ignoring DESK_PROVIDER: {err}"),
            }
        }
        if let Some(model) = lookup("DESK_MODEL") {
            self.model = Some(model);
        }
        if let Some(api_key) = lookup("DESK_API_KEY") {
            self.api_key = Some(api_key);
        }

        if self.api_key.is_none() {
            self.api_key = lookup(self.provider.credential_env_var());
        }
        if self.api_key.is_none() && self.provider == Provider::Local {
            self.api_key = Some(DEFAULT_LOCAL_LLM_URL.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn provider_parses_case_insensitively() {
        assert_eq!("OpenRouter".parse::<Provider>(), Ok(Provider::OpenRouter));
        assert_eq!(" ollama ".parse::<Provider>(), Ok(Provider::Local));
        assert!("anthropic".parse::<Provider>().is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = DeskConfig::from_file(&dir.path().join("desk.toml"));
        assert_eq!(config, DeskConfig::default());
    }

    #[test]
    fn file_values_are_loaded_with_defaults_for_the_rest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("desk.toml");
        std::fs::write(&path, "provider = \"groq\"\nmodel = \"llama3-70b-8192\"\n").expect("write");

        let config = DeskConfig::from_file(&path);
        assert_eq!(config.provider, Provider::Groq);
        assert_eq!(config.model.as_deref(), Some("llama3-70b-8192"));
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("desk.toml");
        std::fs::write(&path, "provider = [").expect("write");
        assert_eq!(DeskConfig::from_file(&path), DeskConfig::default());
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut config = DeskConfig::default();
        config.apply_overrides(env(&[
            ("DESK_BASE_URL", "http://desk:9000"),
            ("DESK_PROVIDER", "openrouter"),
            ("DESK_API_KEY", "sk-direct"),
            ("OPENROUTER_API_KEY", "sk-provider"),
        ]));

        assert_eq!(config.base_url, "http://desk:9000");
        assert_eq!(config.provider, Provider::OpenRouter);
        assert_eq!(config.api_key.as_deref(), Some("sk-direct"));
    }

    #[test]
    fn provider_credential_is_used_when_no_key_configured() {
        let mut config = DeskConfig::default();
        config.apply_overrides(env(&[("DESK_PROVIDER", "groq"), ("GROQ_API_KEY", "gsk-1")]));
        assert_eq!(config.api_key.as_deref(), Some("gsk-1"));
    }

    #[test]
    fn local_provider_defaults_to_ollama_url() {
        let mut config = DeskConfig::default();
        config.apply_overrides(env(&[("DESK_PROVIDER", "local")]));
        assert_eq!(config.api_key.as_deref(), Some(DEFAULT_LOCAL_LLM_URL));
    }

    #[test]
    fn invalid_provider_is_ignored() {
        let mut config = DeskConfig::default();
        config.apply_overrides(env(&[("DESK_PROVIDER", "mystery"), ("DESK_MODEL", "  ")]));
        assert_eq!(config.provider, Provider::OpenAi);
        assert!(config.model.is_none());
    }
}
