use anyhow::{anyhow, Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for forgemirror
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Base directory the mirror tree is written under
    #[serde(default = "default_mirror_dir")]
    pub mirror_dir: String,

    /// Forge API access token. Supplied via the FORGE_TOKEN environment
    /// variable at startup and never written back to the config file.
    #[serde(skip)]
    pub token: String,

    /// Enable debug-level logging
    #[serde(default)]
    pub verbose: bool,

    /// Forge API settings
    #[serde(default)]
    pub forge: ForgeConfig,

    /// Synchronization behavior settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Scheduling settings for the long-lived driver
    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// Forge API configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ForgeConfig {
    /// Base URL of the forge REST API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Repositories requested per listing page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Minimum delay between page requests in milliseconds
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Maximum rate-limit retries per page before the pass is aborted
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Synchronization configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Maximum parallel clone/update actions
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Timeout for a single git operation in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Git executable to invoke
    #[serde(default = "default_git_program")]
    pub git_program: String,
}

/// Scheduling configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DaemonConfig {
    /// Seconds between mirror passes
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

// Default value functions
fn default_mirror_dir() -> String {
    "./repos".to_string()
}
fn default_api_base() -> String {
    "https://api.github.com".to_string()
}
fn default_page_size() -> usize {
    100
}
fn default_request_delay_ms() -> u64 {
    500
}
fn default_max_retries() -> u32 {
    5
}
fn default_concurrency() -> usize {
    1
}
fn default_timeout() -> u64 {
    300
}
fn default_git_program() -> String {
    "git".to_string()
}
fn default_interval() -> u64 {
    86400
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            page_size: default_page_size(),
            request_delay_ms: default_request_delay_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: default_timeout(),
            git_program: default_git_program(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mirror_dir: default_mirror_dir(),
            token: String::new(),
            verbose: false,
            forge: ForgeConfig::default(),
            sync: SyncConfig::default(),
            daemon: DaemonConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location or create a default config
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            let config = Self::default();

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }

            config.save(&config_path)?;

            tracing::info!("Created default configuration at: {:?}", config_path);
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_paths()?;

        Ok(config)
    }

    /// Save configuration to a file. The token is marked `serde(skip)` and is
    /// never part of the serialized output.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("forgemirror").join("config.yml"))
    }

    /// Expand environment variables in configuration paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.mirror_dir = shellexpand::full(&self.mirror_dir)
            .context("Failed to expand mirror_dir path")?
            .into_owned();

        Ok(())
    }

    /// Apply environment variable overrides. This is the single place the
    /// process environment is consulted; components only ever see the
    /// resulting Config value.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.token = std::env::var("FORGE_TOKEN").unwrap_or_default();
        if self.token.is_empty() {
            return Err(anyhow!(
                "FORGE_TOKEN not set. Export a forge API token with access to the \
                 repositories you want to mirror:\n    export FORGE_TOKEN=your_token_here"
            ));
        }

        if let Ok(dir) = std::env::var("MIRROR_DIR") {
            if !dir.is_empty() {
                self.mirror_dir = dir;
                self.expand_paths()?;
            }
        }

        if let Ok(interval) = std::env::var("PASS_INTERVAL_SECONDS") {
            self.daemon.interval_secs = interval
                .parse()
                .context("PASS_INTERVAL_SECONDS is not a valid number of seconds")?;
        }

        if let Ok(concurrency) = std::env::var("CONCURRENCY") {
            self.sync.concurrency = concurrency
                .parse()
                .context("CONCURRENCY is not a valid worker count")?;
        }

        if let Ok(verbose) = std::env::var("VERBOSE") {
            self.verbose = matches!(verbose.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        Ok(())
    }

    /// Base directory of the mirror tree
    pub fn mirror_dir_path(&self) -> PathBuf {
        PathBuf::from(&self.mirror_dir)
    }

    /// Delay enforced between listing page requests
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.forge.request_delay_ms)
    }

    /// Timeout applied to a single git operation
    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.timeout_secs)
    }

    /// Interval between mirror passes
    pub fn pass_interval(&self) -> Duration {
        Duration::from_secs(self.daemon.interval_secs)
    }
}
