use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::ConfigError;

pub const CONFIG_FILE: &str = ".dualagent.json";
/// Historical name some deployments still use.
pub const LEGACY_CONFIG_FILE: &str = ".checkmate.json";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Openai,
    Anthropic,
}

impl ProviderKind {
    pub fn id(&self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    pub fn required_env_var(&self) -> &'static str {
        match self {
            Self::Openai => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            Self::Openai => "gpt-4o",
            Self::Anthropic => "claude-sonnet-4-20250514",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewMode {
    #[default]
    Always,
    Selective,
    FinalOnly,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStrictness {
    Lenient,
    #[default]
    Balanced,
    Strict,
}

/// Per-cycle configuration, read-only once loaded.
///
/// Unknown fields in the config file are ignored.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub builder_provider: ProviderKind,
    pub builder_model: Option<String>,
    pub reviewer_provider: ProviderKind,
    pub reviewer_model: Option<String>,
    pub moderator_provider: ProviderKind,
    pub moderator_model: Option<String>,
    pub test_command: String,
    pub allow_paths: Vec<String>,
    pub max_iterations: u32,
    pub review_mode: ReviewMode,
    pub review_on_test_pass: bool,
    pub enable_moderator: bool,
    pub context_summary_threshold: usize,
    pub review_strictness: ReviewStrictness,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            builder_provider: ProviderKind::Openai,
            builder_model: None,
            reviewer_provider: ProviderKind::Anthropic,
            reviewer_model: None,
            moderator_provider: ProviderKind::Anthropic,
            moderator_model: None,
            test_command: "npm test".to_string(),
            allow_paths: vec!["**/*".to_string()],
            max_iterations: 3,
            review_mode: ReviewMode::Always,
            review_on_test_pass: true,
            enable_moderator: false,
            context_summary_threshold: 2_000,
            review_strictness: ReviewStrictness::Balanced,
        }
    }
}

impl Config {
    /// Load from the workspace root, tolerating both config file names.
    pub fn load(workspace_root: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let root = workspace_root.as_ref();
        let path = [CONFIG_FILE, LEGACY_CONFIG_FILE]
            .iter()
            .map(|name| root.join(name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| ConfigError::MissingFile(root.display().to_string()))?;

        let raw = std::fs::read_to_string(&path).map_err(|error| ConfigError::Read {
            path: path.display().to_string(),
            message: error.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|error| ConfigError::Parse {
            path: path.display().to_string(),
            message: error.to_string(),
        })
    }

    pub fn builder_model(&self) -> &str {
        self.builder_model
            .as_deref()
            .unwrap_or_else(|| self.builder_provider.default_model())
    }

    pub fn reviewer_model(&self) -> &str {
        self.reviewer_model
            .as_deref()
            .unwrap_or_else(|| self.reviewer_provider.default_model())
    }

    pub fn moderator_model(&self) -> &str {
        self.moderator_model
            .as_deref()
            .unwrap_or_else(|| self.moderator_provider.default_model())
    }

    /// Providers this config actually uses, moderator included only when enabled.
    pub fn active_providers(&self) -> Vec<ProviderKind> {
        let mut candidates = vec![self.builder_provider, self.reviewer_provider];
        if self.enable_moderator {
            candidates.push(self.moderator_provider);
        }
        let mut providers = Vec::new();
        for provider in candidates {
            if !providers.contains(&provider) {
                providers.push(provider);
            }
        }
        providers
    }

    /// Fatal at startup when a configured provider's API key is absent.
    pub fn check_credentials(&self) -> Result<(), ConfigError> {
        for provider in self.active_providers() {
            let var = provider.required_env_var();
            if std::env::var(var).is_err() {
                return Err(ConfigError::MissingEnvVar {
                    var: var.to_string(),
                    provider: provider.id().to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Optional `WORKSPACE_ROOT` override.
pub fn workspace_root_from_env() -> Option<PathBuf> {
    std::env::var("WORKSPACE_ROOT").ok().map(PathBuf::from)
}

/// Optional `PORT` override for the outer transport.
pub fn port_from_env() -> Option<u16> {
    std::env::var("PORT").ok().and_then(|raw| raw.parse().ok())
}
