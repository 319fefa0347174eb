use std::fs;
use std::path::Path;

use serde::Deserialize;
use toml_edit::{DocumentMut, Item, Table};

use crate::util::paths::config_path;
use crate::workbench::DEFAULT_MAX_TABS;

/// Example configuration file contents (bundled with the binary)
pub const EXAMPLE_CONFIG: &str = include_str!("config.toml.example");

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Maximum number of tabs allowed
    pub max_tabs: usize,
    /// Messages loaded when reopening a project
    pub history_limit: usize,
    /// Local model server settings
    pub model: ModelConfig,
    /// Prompt construction settings
    pub prompt: PromptConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    /// Base URL of the Ollama server
    pub base_url: String,
    /// Model tag used for generation
    pub name: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptConfig {
    /// Replaces the built-in leading system prompt when set
    pub system_prompt: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            name: "gemma3:4b".to_string(),
            timeout_secs: 120,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_tabs: DEFAULT_MAX_TABS,
            history_limit: 50,
            model: ModelConfig::default(),
            prompt: PromptConfig::default(),
        }
    }
}

/// TOML representation of the [model] section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlModelConfig {
    pub base_url: Option<String>,
    pub name: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// TOML representation of the [prompt] section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlPromptConfig {
    pub system_prompt: Option<String>,
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub max_tabs: Option<usize>,
    pub history_limit: Option<usize>,
    pub model: Option<TomlModelConfig>,
    pub prompt: Option<TomlPromptConfig>,
}

impl Config {
    /// Load configuration from file, merging with defaults
    pub fn load() -> Self {
        let config_file = config_path();

        // Create example config on first run
        if !config_file.exists() {
            Self::create_default_config(&config_file);
        }

        Self::load_from(&config_file)
    }

    /// Load from an explicit path; unreadable or invalid files yield defaults
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring invalid config file");
                Config::default()
            }),
            Err(_) => Config::default(),
        }
    }

    /// Parse TOML, keeping defaults for every absent key
    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        let toml_config = toml::from_str::<TomlConfig>(contents)?;
        let mut config = Config::default();

        if let Some(max_tabs) = toml_config.max_tabs.filter(|n| *n > 0) {
            config.max_tabs = max_tabs;
        }
        if let Some(history_limit) = toml_config.history_limit.filter(|n| *n > 0) {
            config.history_limit = history_limit;
        }

        if let Some(model) = toml_config.model {
            if let Some(base_url) = model.base_url {
                config.model.base_url = base_url.trim_end_matches('/').to_string();
            }
            if let Some(name) = model.name {
                config.model.name = name;
            }
            if let Some(timeout_secs) = model.timeout_secs {
                config.model.timeout_secs = timeout_secs;
            }
        }

        if let Some(prompt) = toml_config.prompt {
            config.prompt.system_prompt = prompt.system_prompt.filter(|s| !s.trim().is_empty());
        }

        Ok(config)
    }

    /// Create the default config file from the bundled example
    fn create_default_config(path: &Path) {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    tracing::warn!(error = %e, "Failed to create config directory");
                    return;
                }
            }
        }

        if let Err(e) = fs::write(path, EXAMPLE_CONFIG) {
            tracing::warn!(error = %e, "Failed to write default config");
        }
    }
}

/// Save the selected model to the config file
pub fn save_model_name(name: &str) -> std::io::Result<()> {
    save_model_name_to(&config_path(), name)
}

/// Set `[model] name` in the file at `config_file`, preserving all other content
pub fn save_model_name_to(config_file: &Path, name: &str) -> std::io::Result<()> {
    // Read existing config or start with empty document
    let contents = if config_file.exists() {
        fs::read_to_string(config_file)?
    } else {
        String::new()
    };

    let mut doc: DocumentMut = contents
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    // Ensure [model] section exists
    if !doc.contains_key("model") {
        doc["model"] = Item::Table(Table::new());
    }
    doc["model"]["name"] = toml_edit::value(name);

    if let Some(parent) = config_file.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    fs::write(config_file, doc.to_string())?;

    Ok(())
}
