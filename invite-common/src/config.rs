//! Configuration loading and root folder resolution
//!
//! Resolution order for every setting:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing or unreadable TOML file is never fatal: it is logged and the
//! remaining tiers are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "INVITE_ROOT_FOLDER";
/// Environment variable pointing at an explicit TOML file
pub const CONFIG_FILE_ENV: &str = "INVITE_CONFIG";
/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "invite.db";

/// Contents of `config.toml`
///
/// Every field is optional so a partial file only overrides what it names.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sms: SmsConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info` or `invite_gw=debug`
    pub level: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Guest sessions untouched this long are dropped
    pub session_idle_secs: Option<u64>,
    /// Upper bound on guest sessions held in memory
    pub max_sessions: Option<usize>,
}

/// Which SMS transport to use and how to reach it
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SmsConfig {
    /// `log` (development) or `http`
    pub transport: Option<String>,
    pub endpoint: Option<String>,
    pub sender: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VerificationConfig {
    pub code_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowConfig {
    pub resend_cooldown_secs: Option<u64>,
    pub arrival_delay_secs: Option<u64>,
}

/// Platform defaults used when nothing else is configured
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub host: String,
    pub port: u16,
    pub code_ttl_secs: u64,
    pub resend_cooldown_secs: u64,
    pub arrival_delay_secs: u64,
    pub session_idle_secs: u64,
    pub max_sessions: usize,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: "info".to_string(),
            host: "127.0.0.1".to_string(),
            port: 5780,
            code_ttl_secs: 300,
            resend_cooldown_secs: 30,
            arrival_delay_secs: 5,
            session_idle_secs: 1800,
            max_sessions: 10_000,
        }
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/invite (or /var/lib/invite for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("invite"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/invite"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/invite
        dirs::data_dir()
            .map(|d| d.join("invite"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/invite"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\invite
        dirs::data_local_dir()
            .map(|d| d.join("invite"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\invite"))
    } else {
        PathBuf::from("./invite_data")
    }
}

/// Default configuration file path for the platform, if one exists
pub fn find_config_file() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_FILE_ENV) {
        return Some(PathBuf::from(explicit));
    }

    let user_config = dirs::config_dir().map(|d| d.join("invite").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/invite/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Load the TOML config, degrading to an empty config on any failure
pub fn load_toml_config_or_default(path: Option<&Path>) -> TomlConfig {
    let path = match path.map(Path::to_path_buf).or_else(find_config_file) {
        Some(path) => path,
        None => {
            debug!("No config file found, using defaults");
            return TomlConfig::default();
        }
    };

    match load_toml_config(&path) {
        Ok(config) => {
            debug!("Loaded config file: {}", path.display());
            config
        }
        Err(e) => {
            warn!("Ignoring config file {}: {}", path.display(), e);
            TomlConfig::default()
        }
    }
}

/// Root folder resolution across the four tiers
pub struct RootFolderResolver<'a> {
    cli_arg: Option<PathBuf>,
    toml: &'a TomlConfig,
}

impl<'a> RootFolderResolver<'a> {
    pub fn new(cli_arg: Option<PathBuf>, toml: &'a TomlConfig) -> Self {
        Self { cli_arg, toml }
    }

    pub fn resolve(&self) -> PathBuf {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        // Priority 3: TOML config file
        if let Some(path) = &self.toml.root_folder {
            return path.clone();
        }

        // Priority 4: OS-dependent compiled default
        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and locates files inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }
}
