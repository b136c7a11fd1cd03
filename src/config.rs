use std::path::PathBuf;
use std::time::Duration;

use actix_web::cookie::Key;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "@cf/meta/llama-3.1-8b-instruct";
pub const DEFAULT_AI_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("TLS_CERT and TLS_KEY must be set together")]
    IncompleteTls,
}

/// How strictly the assistant is told to quote notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CitationMode {
    Strict,
    Relaxed,
}

#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub persistence: bool,
    pub citations: CitationMode,
}

impl Default for ChatSettings {
    fn default() -> Self {
        ChatSettings {
            persistence: true,
            citations: CitationMode::Strict,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InferenceSettings {
    pub account_id: Option<String>,
    pub api_token: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

/// Passwords used to create the two accounts the first time they are needed.
#[derive(Debug, Clone)]
pub struct BootstrapPasswords {
    pub wendy: String,
    pub daniel: String,
}

impl Default for BootstrapPasswords {
    fn default() -> Self {
        BootstrapPasswords {
            wendy: "wendy123".to_string(),
            daniel: "daniel123".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TlsFiles {
    pub certificate: PathBuf,
    pub private_key: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub ip: String,
    pub port: u16,
    pub database_url: String,
    pub session_secret: Option<String>,
    pub cookie_secure: bool,
    pub bootstrap: BootstrapPasswords,
    pub inference: InferenceSettings,
    pub chat: ChatSettings,
    pub tls: Option<TlsFiles>,
    pub static_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let port = match get("PORT") {
            Some(value) => value.parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: "PORT",
                value: value.clone(),
                reason: e.to_string(),
            })?,
            None => 8081,
        };

        let session_secret = get("SESSION_SECRET");
        if let Some(secret) = &session_secret {
            if secret.len() < 32 {
                return Err(ConfigError::Invalid {
                    name: "SESSION_SECRET",
                    value: "<redacted>".to_string(),
                    reason: "must be at least 32 bytes long".to_string(),
                });
            }
        }

        let timeout_secs = match get("AI_TIMEOUT_SECS") {
            Some(value) => value.parse::<u64>().map_err(|e| ConfigError::Invalid {
                name: "AI_TIMEOUT_SECS",
                value: value.clone(),
                reason: e.to_string(),
            })?,
            None => 60,
        };

        let citations = match get("CHAT_CITATIONS").as_deref() {
            None | Some("strict") => CitationMode::Strict,
            Some("relaxed") => CitationMode::Relaxed,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "CHAT_CITATIONS",
                    value: other.to_string(),
                    reason: "expected `strict` or `relaxed`".to_string(),
                })
            }
        };

        let tls = match (get("TLS_CERT"), get("TLS_KEY")) {
            (Some(certificate), Some(private_key)) => Some(TlsFiles {
                certificate: certificate.into(),
                private_key: private_key.into(),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteTls),
        };

        let defaults = BootstrapPasswords::default();

        Ok(Config {
            ip: get("IP").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            database_url: get("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://couple_memory.db".to_string()),
            session_secret,
            cookie_secure: parse_flag("COOKIE_SECURE", get("COOKIE_SECURE"), false)?,
            bootstrap: BootstrapPasswords {
                wendy: get("WENDY_PASSWORD").unwrap_or(defaults.wendy),
                daniel: get("DANIEL_PASSWORD").unwrap_or(defaults.daniel),
            },
            inference: InferenceSettings {
                account_id: get("CLOUDFLARE_ACCOUNT_ID"),
                api_token: get("CLOUDFLARE_API_TOKEN"),
                model: get("AI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                base_url: get("AI_BASE_URL").unwrap_or_else(|| DEFAULT_AI_BASE_URL.to_string()),
                timeout: Duration::from_secs(timeout_secs),
            },
            chat: ChatSettings {
                persistence: parse_flag("CHAT_PERSISTENCE", get("CHAT_PERSISTENCE"), true)?,
                citations,
            },
            tls,
            static_dir: get("STATIC_DIR").map(PathBuf::from),
        })
    }

    /// Cookie signing key. Without a configured secret a random key is used,
    /// so sessions do not survive a restart.
    pub fn session_key(&self) -> Key {
        match &self.session_secret {
            Some(secret) => Key::derive_from(secret.as_bytes()),
            None => {
                log::warn!("SESSION_SECRET not set, sessions will not survive a restart");
                Key::generate()
            }
        }
    }
}

fn parse_flag(name: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value,
            reason: "expected a boolean".to_string(),
        }),
    }
}
