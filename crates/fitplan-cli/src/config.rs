//! Configuration file management for fitplan.
//!
//! Provides a TOML-based config file at `~/.config/fitplan/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fitplan_core::OrchestratorConfig;
use fitplan_core::generator::OpenAiConfig;
use fitplan_core::generator::openai::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use fitplan_core::navigation::Route;
use fitplan_db::config::DbConfig;

pub const ENV_USER_ID: &str = "FITPLAN_USER_ID";
pub const ENV_LLM_API_KEY: &str = "FITPLAN_LLM_API_KEY";
pub const ENV_LLM_BASE_URL: &str = "FITPLAN_LLM_BASE_URL";
pub const ENV_LLM_MODEL: &str = "FITPLAN_LLM_MODEL";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    pub user: UserSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub generation: GenerationSection,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct UserSection {
    /// The local user this CLI acts as.
    pub id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmSection {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        let defaults = OpenAiConfig::default();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout_secs: defaults.timeout.as_secs(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationSection {
    pub allow_fallback: bool,
    pub min_retry_interval_secs: u64,
    pub on_failure_route: String,
    pub slow_response_secs: u64,
}

impl Default for GenerationSection {
    fn default() -> Self {
        let defaults = OrchestratorConfig::default();
        Self {
            allow_fallback: defaults.allow_fallback,
            min_retry_interval_secs: defaults.min_retry_interval.as_secs(),
            on_failure_route: defaults.on_failure_route.to_string(),
            slow_response_secs: defaults.slow_response_after.as_secs(),
        }
    }
}

impl GenerationSection {
    pub fn to_orchestrator_config(&self) -> Result<OrchestratorConfig> {
        let on_failure_route: Route = self
            .on_failure_route
            .parse()
            .with_context(|| format!("invalid generation.on_failure_route {:?}", self.on_failure_route))?;
        Ok(OrchestratorConfig {
            allow_fallback: self.allow_fallback,
            min_retry_interval: Duration::from_secs(self.min_retry_interval_secs),
            on_failure_route,
            slow_response_after: Duration::from_secs(self.slow_response_secs),
            ..OrchestratorConfig::default()
        })
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the fitplan config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/fitplan` or `~/.config/fitplan`,
/// on macOS too.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("fitplan");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("fitplan")
}

/// Return the path to the fitplan config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    toml::from_str(&contents).context("failed to parse config file")
}

/// Serialize and write the config file, creating parent dirs as needed.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    save_config_to(config, &config_path())
}

/// Write `config` to `path` with 0600 permissions on Unix.
pub fn save_config_to(config: &ConfigFile, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct FitplanConfig {
    pub db_config: DbConfig,
    pub llm: OpenAiConfig,
    pub orchestrator: OrchestratorConfig,
    user_id: Option<Uuid>,
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl FitplanConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `cli_db_url` > `FITPLAN_DATABASE_URL` > `database.url` > `DbConfig::DEFAULT_URL`
    /// - User: `cli_user` > `FITPLAN_USER_ID` > `user.id` > unset
    /// - LLM: `FITPLAN_LLM_*` > `[llm]` > defaults
    pub fn resolve(cli_db_url: Option<&str>, cli_user: Option<Uuid>) -> Result<Self> {
        let file_config = load_config().ok();

        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Some(url) = env_nonempty(DbConfig::ENV_VAR) {
            url
        } else if let Some(ref cfg) = file_config {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };

        let user_id = match (cli_user, env_nonempty(ENV_USER_ID)) {
            (Some(id), _) => Some(id),
            (None, Some(raw)) => Some(
                Uuid::parse_str(raw.trim())
                    .with_context(|| format!("{ENV_USER_ID} is not a valid UUID"))?,
            ),
            (None, None) => file_config.as_ref().map(|cfg| cfg.user.id),
        };

        let llm_section = file_config.as_ref().map(|cfg| &cfg.llm);
        let defaults = LlmSection::default();
        let llm_section = llm_section.unwrap_or(&defaults);
        let llm = OpenAiConfig {
            base_url: env_nonempty(ENV_LLM_BASE_URL).unwrap_or_else(|| llm_section.base_url.clone()),
            api_key: env_nonempty(ENV_LLM_API_KEY).or_else(|| llm_section.api_key.clone()),
            model: env_nonempty(ENV_LLM_MODEL).unwrap_or_else(|| llm_section.model.clone()),
            timeout: Duration::from_secs(llm_section.timeout_secs),
            ..OpenAiConfig::default()
        };

        let orchestrator = match file_config {
            Some(ref cfg) => cfg.generation.to_orchestrator_config()?,
            None => OrchestratorConfig::default(),
        };

        Ok(Self {
            db_config: DbConfig::new(db_url),
            llm,
            orchestrator,
            user_id,
        })
    }

    /// The user to act as, or an error explaining how to set one.
    pub fn require_user(&self) -> Result<Uuid> {
        self.user_id.with_context(|| {
            format!("user id not found; pass --user, set {ENV_USER_ID}, or run `fitplan init`")
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
