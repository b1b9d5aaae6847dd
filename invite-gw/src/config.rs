//! Service configuration
//!
//! Command line (with clap `env` fallbacks) beats the TOML file, which
//! beats compiled defaults. The SMS API key is read from
//! `INVITE_SMS_API_KEY` before the TOML file so it can stay out of it.

use std::path::PathBuf;
use std::time::Duration;

use invite_common::config::{CompiledDefaults, RootFolderResolver, TomlConfig};
use invite_common::{Error, Result};

use crate::registry::SessionSettings;
use crate::workflow::WorkflowSettings;

/// Environment variable holding the SMS gateway API key
pub const SMS_API_KEY_ENV: &str = "INVITE_SMS_API_KEY";

/// Values taken from the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root_folder: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub sms_transport: Option<String>,
}

/// How verification codes leave the building
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmsSettings {
    /// Write messages to the log (development only)
    Log,
    Http {
        endpoint: String,
        sender: String,
        api_key: String,
    },
}

#[derive(Debug, Clone)]
pub struct GwConfig {
    pub root_folder: PathBuf,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub sms: SmsSettings,
    pub workflow: WorkflowSettings,
    pub sessions: SessionSettings,
}

impl GwConfig {
    pub fn resolve(cli: CliOverrides, toml: &TomlConfig) -> Result<Self> {
        let defaults = CompiledDefaults::for_current_platform();

        let root_folder = RootFolderResolver::new(cli.root_folder, toml).resolve();
        let host = cli
            .host
            .or_else(|| toml.server.host.clone())
            .unwrap_or(defaults.host);
        let port = cli.port.or(toml.server.port).unwrap_or(defaults.port);
        let log_level = toml.logging.level.clone().unwrap_or(defaults.log_level);

        let transport = cli
            .sms_transport
            .or_else(|| toml.sms.transport.clone())
            .unwrap_or_else(|| "log".to_string());
        let sms = match transport.as_str() {
            "log" => SmsSettings::Log,
            "http" => {
                let endpoint = toml
                    .sms
                    .endpoint
                    .clone()
                    .ok_or_else(|| Error::Config("sms.endpoint is required for the http transport".to_string()))?;
                let sender = toml
                    .sms
                    .sender
                    .clone()
                    .ok_or_else(|| Error::Config("sms.sender is required for the http transport".to_string()))?;
                let api_key = std::env::var(SMS_API_KEY_ENV)
                    .ok()
                    .filter(|key| !key.trim().is_empty())
                    .or_else(|| toml.sms.api_key.clone())
                    .ok_or_else(|| {
                        Error::Config(format!(
                            "{} or sms.api_key is required for the http transport",
                            SMS_API_KEY_ENV
                        ))
                    })?;
                SmsSettings::Http {
                    endpoint,
                    sender,
                    api_key,
                }
            }
            other => return Err(Error::Config(format!("Unknown SMS transport: {}", other))),
        };

        let workflow = WorkflowSettings {
            code_ttl: Duration::from_secs(toml.verification.code_ttl_secs.unwrap_or(defaults.code_ttl_secs)),
            resend_cooldown: Duration::from_secs(
                toml.workflow
                    .resend_cooldown_secs
                    .unwrap_or(defaults.resend_cooldown_secs),
            ),
            arrival_delay: Duration::from_secs(
                toml.workflow
                    .arrival_delay_secs
                    .unwrap_or(defaults.arrival_delay_secs),
            ),
        };

        if workflow.code_ttl.is_zero() {
            return Err(Error::Config("verification.code_ttl_secs must be positive".to_string()));
        }

        let sessions = SessionSettings {
            idle_ttl: Duration::from_secs(toml.server.session_idle_secs.unwrap_or(defaults.session_idle_secs)),
            max_open: toml.server.max_sessions.unwrap_or(defaults.max_sessions),
        };
        if sessions.idle_ttl.is_zero() || sessions.max_open == 0 {
            return Err(Error::Config(
                "server.session_idle_secs and server.max_sessions must be positive".to_string(),
            ));
        }

        Ok(Self {
            root_folder,
            host,
            port,
            log_level,
            sms,
            workflow,
            sessions,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invite_common::config::{ServerConfig, SmsConfig};

    #[test]
    fn test_defaults_without_any_config() {
        let config = GwConfig::resolve(
            CliOverrides {
                root_folder: Some(PathBuf::from("/tmp/invite-test")),
                ..Default::default()
            },
            &TomlConfig::default(),
        )
        .unwrap();

        assert_eq!(config.bind_address(), "127.0.0.1:5780");
        assert_eq!(config.sms, SmsSettings::Log);
        assert_eq!(config.workflow, WorkflowSettings::default());
        assert_eq!(config.sessions, SessionSettings::default());
    }

    #[test]
    fn test_session_limits_from_toml() {
        let toml = TomlConfig {
            server: ServerConfig {
                session_idle_secs: Some(600),
                max_sessions: Some(50),
                ..Default::default()
            },
            ..Default::default()
        };
        let config = GwConfig::resolve(
            CliOverrides {
                root_folder: Some(PathBuf::from("/tmp/invite-test")),
                ..Default::default()
            },
            &toml,
        )
        .unwrap();

        assert_eq!(config.sessions.idle_ttl, Duration::from_secs(600));
        assert_eq!(config.sessions.max_open, 50);
    }

    #[test]
    fn test_zero_session_cap_rejected() {
        let toml = TomlConfig {
            server: ServerConfig {
                max_sessions: Some(0),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = GwConfig::resolve(
            CliOverrides {
                root_folder: Some(PathBuf::from("/tmp/invite-test")),
                ..Default::default()
            },
            &toml,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml = TomlConfig {
            server: ServerConfig {
                host: Some("0.0.0.0".to_string()),
                port: Some(8080),
                ..Default::default()
            },
            ..Default::default()
        };
        let config = GwConfig::resolve(
            CliOverrides {
                root_folder: Some(PathBuf::from("/tmp/invite-test")),
                port: Some(9090),
                ..Default::default()
            },
            &toml,
        )
        .unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:9090");
    }

    #[test]
    fn test_http_transport_requires_endpoint() {
        let toml = TomlConfig {
            sms: SmsConfig {
                transport: Some("http".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = GwConfig::resolve(
            CliOverrides {
                root_folder: Some(PathBuf::from("/tmp/invite-test")),
                ..Default::default()
            },
            &toml,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unknown_transport_rejected() {
        let err = GwConfig::resolve(
            CliOverrides {
                root_folder: Some(PathBuf::from("/tmp/invite-test")),
                sms_transport: Some("pigeon".to_string()),
                ..Default::default()
            },
            &TomlConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
