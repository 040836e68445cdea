//! Configuration file loading and validation
//!
//! The bot reads a single TOML file describing credentials, storage and the
//! set of repositories it serves.

use crate::error::{Error, Result};
use crate::types::RepoId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Test-trigger comment posted when none is configured
pub const DEFAULT_RUN_TEST_COMMAND: &str = "/run-all-tests";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// GitHub credentials
    pub github: GitHubConfig,
    /// Slack credentials
    #[serde(default)]
    pub slack: SlackConfig,
    /// Persistence settings
    #[serde(default)]
    pub database: DatabaseConfig,
    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Served repositories
    #[serde(default)]
    pub repos: Vec<RepoConfig>,
}

/// GitHub credentials and bot identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Personal access token of the bot account
    pub token: String,
    /// Bot login; cherry-pick branches are pushed to its fork
    pub bot: String,
    /// GitHub Enterprise host (None for github.com)
    #[serde(default)]
    pub host: Option<String>,
}

/// Slack settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Bot token (`xoxb-...`)
    #[serde(default)]
    pub token: String,
    /// Log messages instead of sending them
    #[serde(default)]
    pub mute: bool,
}

/// Persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path, or `:memory:` for in-memory stores
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl DatabaseConfig {
    /// Whether state is kept in memory only
    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_address")]
    pub address: String,
    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
        }
    }
}

/// Per-repository settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct RepoConfig {
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Secret used to sign webhook deliveries
    #[serde(default)]
    pub webhook_secret: String,
    /// Cherry-pick label pattern with one capture group for the version
    #[serde(default)]
    pub rule: String,
    /// Release branch template containing `[version]`
    #[serde(default)]
    pub release: String,
    /// Label template applied to cherry-pick PRs
    #[serde(default)]
    pub type_label: String,
    /// Labels matching this pattern are not copied to cherry-pick PRs
    #[serde(default)]
    pub ignore_label: String,
    /// Label template applied to the source PR after a successful pick
    #[serde(default)]
    pub replace_label: String,
    /// Comment that triggers CI
    #[serde(default = "default_run_test_command")]
    pub run_test_command: String,
    /// Enable cherry picking
    #[serde(default)]
    pub cherry_pick: bool,
    /// Simulate PR submission
    #[serde(default)]
    pub dryrun: bool,
    /// Channel receiving every cherry-pick notification
    #[serde(default)]
    pub cherry_pick_channel: String,
    /// Comma-separated logins notified when an author has no chat mapping
    #[serde(default)]
    pub default_checker: String,
    /// Enable auto merge
    #[serde(default)]
    pub merge: bool,
    /// Label marking a PR as ready for auto merge
    #[serde(default)]
    pub can_merge_label: String,
    /// Append `Signed-off-by` lines to merge commits
    #[serde(default)]
    pub signed_off_message: bool,
    /// Merge scheduler tick interval
    #[serde(default = "default_merge_interval_secs")]
    pub merge_interval_secs: u64,
    /// Wait after requesting a branch update
    #[serde(default = "default_settle_secs")]
    pub update_settle_secs: u64,
    /// Wait after posting the test-trigger comment
    #[serde(default = "default_settle_secs")]
    pub test_settle_secs: u64,
    /// Attempts for a cherry-pick workspace run
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Directory in which cherry-pick workspaces are created
    #[serde(default = "default_work_dir")]
    pub work_dir: String,
}

fn default_database_path() -> String {
    "backport-bot.db".to_string()
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    8080
}

fn default_run_test_command() -> String {
    DEFAULT_RUN_TEST_COMMAND.to_string()
}

const fn default_merge_interval_secs() -> u64 {
    30
}

const fn default_settle_secs() -> u64 {
    120
}

const fn default_retry_attempts() -> u32 {
    1
}

fn default_work_dir() -> String {
    "/tmp".to_string()
}

impl RepoConfig {
    /// Repository id
    pub fn repo_id(&self) -> RepoId {
        RepoId::new(&self.owner, &self.repo)
    }

    /// Routing key (`owner-repo`)
    pub fn key(&self) -> String {
        self.repo_id().key()
    }

    /// Logins listed in `default_checker`
    pub fn default_checkers(&self) -> Vec<&str> {
        self.default_checker
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Test-trigger comment, falling back to the default when blank
    pub fn test_command(&self) -> &str {
        if self.run_test_command.trim().is_empty() {
            DEFAULT_RUN_TEST_COMMAND
        } else {
            &self.run_test_command
        }
    }

    fn validate(&self, origin: &str) -> Result<()> {
        let key = self.key();
        let fail = |what: String| Error::Config(format!("{origin}: repo {key}: {what}"));

        if self.owner.is_empty() || self.repo.is_empty() {
            return Err(Error::Config(format!(
                "{origin}: every repo needs an owner and a repo name"
            )));
        }
        if self.cherry_pick {
            if self.rule.is_empty() {
                return Err(fail("cherry_pick is enabled but rule is empty".into()));
            }
            if self.release.is_empty() {
                return Err(fail("cherry_pick is enabled but release is empty".into()));
            }
        }
        if self.merge && self.can_merge_label.is_empty() {
            return Err(fail("merge is enabled but can_merge_label is empty".into()));
        }
        for (name, pattern) in [("rule", &self.rule), ("ignore_label", &self.ignore_label)] {
            if !pattern.is_empty() {
                Regex::new(pattern).map_err(|e| fail(format!("invalid {name}: {e}")))?;
            }
        }
        if self.merge_interval_secs == 0 {
            return Err(fail("merge_interval_secs must be positive".into()));
        }
        Ok(())
    }
}

impl Config {
    /// Parse configuration from TOML text; `origin` names the source in errors
    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse {origin}: {e}")))?;
        config.validate(origin)?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self, origin: &str) -> Result<()> {
        if self.github.token.is_empty() {
            return Err(Error::Config(format!("{origin}: github.token is empty")));
        }
        if self.github.bot.is_empty() {
            return Err(Error::Config(format!("{origin}: github.bot is empty")));
        }

        let mut seen = HashSet::new();
        for repo in &self.repos {
            repo.validate(origin)?;
            if !seen.insert(repo.key()) {
                return Err(Error::Config(format!(
                    "{origin}: repo {} is configured more than once",
                    repo.key()
                )));
            }
        }
        Ok(())
    }

    /// Find a repository by routing key (`owner-repo`)
    pub fn repo(&self, key: &str) -> Option<&RepoConfig> {
        self.repos.iter().find(|r| r.key() == key)
    }
}

/// Load and validate configuration from disk
pub fn load_config(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
    Config::from_toml_str(&content, &path.display().to_string())
}
