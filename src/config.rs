use std::path::{Path, PathBuf};
use std::str::FromStr;

use lettre::message::Mailbox;
use lettre::Address;
use log::LevelFilter;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration value: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("Failed to load env file: {0}")]
    EnvFile(#[from] dotenv::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    None,
    StartTLS,
    SSL,
}

impl FromStr for SmtpSecurity {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "none" => Ok(SmtpSecurity::None),
            "starttls" => Ok(SmtpSecurity::StartTLS),
            "ssl" | "tls" => Ok(SmtpSecurity::SSL),
            _ => Err(()),
        }
    }
}

#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub security: SmtpSecurity,
}

// Keep the password out of debug output.
impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("security", &self.security)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    Console,
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LevelFilter,
    pub sink: LogSink,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            sink: LogSink::Console,
        }
    }
}

impl LogSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads `LOG_LEVEL`, `LOG_TYPE` and `LOG_PATH`. Only `LOG_PATH` is ever
    /// required, and only for the file sink.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = LogSettings::default();

        if let Some(level) = optional(&lookup, "LOG_LEVEL") {
            settings.level = parse_level(&level).ok_or(ConfigError::Invalid {
                key: "LOG_LEVEL",
                value: level,
            })?;
        }

        if let Some(sink) = optional(&lookup, "LOG_TYPE") {
            settings.sink = match sink.to_lowercase().as_str() {
                "console" | "stderr" => LogSink::Console,
                "file" => LogSink::File(PathBuf::from(required(&lookup, "LOG_PATH")?)),
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "LOG_TYPE",
                        value: sink,
                    })
                }
            };
        }

        Ok(settings)
    }
}

// log4js level names are accepted too, since existing .env files use them.
fn parse_level(value: &str) -> Option<LevelFilter> {
    match value.to_lowercase().as_str() {
        "all" => Some(LevelFilter::Trace),
        "fatal" | "mark" => Some(LevelFilter::Error),
        other => LevelFilter::from_str(other).ok(),
    }
}

/// Everything needed to talk to the relay and sign outgoing mail.
#[derive(Debug, Clone)]
pub struct Config {
    pub smtp: SmtpSettings,
    pub sender: Mailbox,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = required(&lookup, "SMTP_HOST")?;

        let port = required(&lookup, "SMTP_PORT")?;
        let port = port.parse::<u16>().map_err(|_| ConfigError::Invalid {
            key: "SMTP_PORT",
            value: port.clone(),
        })?;

        let username = required(&lookup, "SMTP_USER")?;
        let password = required(&lookup, "SMTP_PASS")?;

        // Port 587 with STARTTLS unless told otherwise
        let security = match optional(&lookup, "SMTP_SECURITY") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                key: "SMTP_SECURITY",
                value: value.clone(),
            })?,
            None => SmtpSecurity::StartTLS,
        };

        let from_name = required(&lookup, "SENDER_FROM_NAME")?;
        let from_email = required(&lookup, "SENDER_FROM_EMAIL")?;
        let address = from_email
            .parse::<Address>()
            .map_err(|_| ConfigError::Invalid {
                key: "SENDER_FROM_EMAIL",
                value: from_email.clone(),
            })?;

        Ok(Config {
            smtp: SmtpSettings {
                host,
                port,
                username,
                password,
                security,
            },
            sender: Mailbox::new(Some(from_name), address),
        })
    }
}

/// Loads `path` into the process environment, or `./.env` when no path is
/// given. A missing default file is not an error.
pub fn load_env_file(path: Option<&Path>) -> Result<(), ConfigError> {
    match path {
        Some(path) => dotenv::from_path(path)?,
        None => {
            if let Err(e) = dotenv::dotenv() {
                if !e.not_found() {
                    return Err(e.into());
                }
            }
        }
    }
    Ok(())
}

fn optional<F>(lookup: &F, key: &'static str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, key).ok_or(ConfigError::Missing(key))
}
