// ABOUTME: Deployment configuration: YAML parsing, env-var override path, validation.
// ABOUTME: The loader is the only place ambient state is read; the core consumes the struct.

mod database;
mod healthcheck;
mod server;

pub use database::DatabaseConfig;
pub use healthcheck::HealthCheckConfig;
pub use server::ServerConfig;

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "caravel.yml";
pub const CONFIG_FILENAME_ALT: &str = "caravel.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".caravel/config.yml";

/// Validated, immutable configuration aggregate for one invocation.
///
/// Overrides (branch, keep count) produce a new instance; nothing mutates a
/// config after construction.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,

    pub repository: RepositoryConfig,

    pub paths: PathsConfig,

    #[serde(default)]
    pub options: OptionsConfig,

    #[serde(default)]
    pub hooks: HooksConfig,

    #[serde(default)]
    pub health_check: HealthCheckConfig,

    /// Extra shared links: path in release -> path under shared/.
    #[serde(default)]
    pub shared_paths: BTreeMap<String, String>,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryConfig {
    pub url: String,

    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    pub deploy_to: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OptionsConfig {
    #[serde(default = "default_keep_releases")]
    pub keep_releases: usize,

    #[serde(default = "default_true")]
    pub install_dependencies: bool,

    #[serde(default)]
    pub build_assets: bool,

    #[serde(default)]
    pub run_migrations: bool,
}

fn default_keep_releases() -> usize {
    5
}

fn default_true() -> bool {
    true
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            keep_releases: default_keep_releases(),
            install_dependencies: true,
            build_assets: false,
            run_migrations: false,
        }
    }
}

/// Pipeline stage a hook command list is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    BeforeClone,
    AfterClone,
    BeforeActivate,
    AfterActivate,
    AfterRollback,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct HooksConfig {
    #[serde(default)]
    pub before_clone: Vec<String>,

    #[serde(default)]
    pub after_clone: Vec<String>,

    #[serde(default)]
    pub before_activate: Vec<String>,

    #[serde(default)]
    pub after_activate: Vec<String>,

    #[serde(default)]
    pub after_rollback: Vec<String>,
}

impl HooksConfig {
    pub fn for_stage(&self, stage: HookStage) -> &[String] {
        match stage {
            HookStage::BeforeClone => &self.before_clone,
            HookStage::AfterClone => &self.after_clone,
            HookStage::BeforeActivate => &self.before_activate,
            HookStage::AfterActivate => &self.after_activate,
            HookStage::AfterRollback => &self.after_rollback,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Resolve the configuration for an invocation.
    ///
    /// A complete `DEPLOY_*` environment (host, username, repository URL)
    /// takes priority over files, then an explicit `--config` path, then
    /// discovery in the working directory.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if has_env_config() {
            return Self::from_env();
        }

        match explicit {
            Some(path) => Self::load(path),
            None => {
                let cwd = std::env::current_dir()?;
                Self::discover(&cwd)
            }
        }
    }

    /// Build the configuration entirely from `DEPLOY_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let config = Config {
            server: ServerConfig {
                host: env_string("DEPLOY_HOST").unwrap_or_default(),
                port: env_parse("DEPLOY_PORT").unwrap_or(22),
                username: env_string("DEPLOY_USERNAME").unwrap_or_default(),
                key_path: env_string("DEPLOY_KEY_PATH"),
                timeout: Duration::from_secs(env_parse("DEPLOY_TIMEOUT").unwrap_or(300)),
                trust_first_connection: true,
            },
            repository: RepositoryConfig {
                url: env_string("DEPLOY_REPO_URL").unwrap_or_default(),
                branch: env_string("DEPLOY_BRANCH").unwrap_or_else(default_branch),
            },
            paths: PathsConfig {
                deploy_to: env_string("DEPLOY_PATH")
                    .unwrap_or_else(|| "/var/www/app".to_string()),
            },
            options: OptionsConfig {
                keep_releases: env_parse("DEPLOY_KEEP_RELEASES").unwrap_or(5),
                install_dependencies: env_bool("DEPLOY_INSTALL_DEPENDENCIES").unwrap_or(true),
                build_assets: env_bool("DEPLOY_BUILD_ASSETS").unwrap_or(false),
                run_migrations: env_bool("DEPLOY_RUN_MIGRATIONS").unwrap_or(false),
            },
            hooks: HooksConfig {
                before_clone: env_lines("DEPLOY_HOOKS_BEFORE_CLONE"),
                after_clone: env_lines("DEPLOY_HOOKS_AFTER_CLONE"),
                before_activate: env_lines("DEPLOY_HOOKS_BEFORE_ACTIVATE"),
                after_activate: env_lines("DEPLOY_HOOKS_AFTER_ACTIVATE"),
                after_rollback: env_lines("DEPLOY_HOOKS_AFTER_ROLLBACK"),
            },
            health_check: HealthCheckConfig {
                enabled: env_bool("DEPLOY_HEALTH_CHECK_ENABLED").unwrap_or(false),
                url: env_string("DEPLOY_HEALTH_CHECK_URL"),
                timeout: Duration::from_secs(
                    env_parse("DEPLOY_HEALTH_CHECK_TIMEOUT").unwrap_or(30),
                ),
            },
            shared_paths: BTreeMap::new(),
            database: DatabaseConfig {
                backup_enabled: env_bool("DEPLOY_DB_BACKUP_ENABLED").unwrap_or(false),
                connection: env_string("DEPLOY_DB_CONNECTION")
                    .unwrap_or_else(|| "mysql".to_string()),
                host: env_string("DEPLOY_DB_HOST"),
                port: env_parse("DEPLOY_DB_PORT"),
                database: env_string("DEPLOY_DB_DATABASE"),
                username: env_string("DEPLOY_DB_USERNAME"),
                password: env_string("DEPLOY_DB_PASSWORD"),
                keep_backups: env_parse("DEPLOY_DB_KEEP_BACKUPS").unwrap_or(5),
            },
            notifications: NotificationsConfig {
                webhook_url: env_string("DEPLOY_NOTIFICATION_WEBHOOK"),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// New config targeting a different branch.
    pub fn with_branch(&self, branch: &str) -> Self {
        let mut config = self.clone();
        config.repository.branch = branch.to_string();
        config
    }

    /// New config with a different keep-releases count.
    pub fn with_keep_releases(&self, keep: usize) -> Self {
        let mut config = self.clone();
        config.options.keep_releases = keep;
        config
    }

    pub fn deploy_root(&self) -> &str {
        self.paths.deploy_to.trim_end_matches('/')
    }

    fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(Error::InvalidConfig("server host is required".to_string()));
        }
        if self.server.username.is_empty() {
            return Err(Error::InvalidConfig(
                "server username is required".to_string(),
            ));
        }
        if self.repository.url.is_empty() {
            return Err(Error::InvalidConfig(
                "repository URL is required".to_string(),
            ));
        }
        if self.paths.deploy_to.is_empty() {
            return Err(Error::InvalidConfig(
                "deployment path is required".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    env_string(key).map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn env_lines(key: &str) -> Vec<String> {
    env_string(key)
        .map(|v| {
            v.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn has_env_config() -> bool {
    env_string("DEPLOY_HOST").is_some()
        && env_string("DEPLOY_USERNAME").is_some()
        && env_string("DEPLOY_REPO_URL").is_some()
}
