use std::{
    fs,
    net::{IpAddr, SocketAddr},
    path::Path,
    time::Duration,
};

use rand::{distributions::Alphanumeric, Rng};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::auth::credentials::{StoredPassword, User};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid listen address {0:?}")]
    Listen(String),
    #[error("redirect origin {0:?} must be an absolute URL with a host")]
    Origin(String),
    #[error("secret must not be empty")]
    EmptySecret,
    #[error("duplicate username {0:?}")]
    DuplicateUser(String),
    #[error("trusted proxy {0:?} is not an IP address")]
    TrustedProxy(String),
    #[error("jail.max_attempts must be at least 1")]
    JailAttempts,
    #[error("jail.ban_duration must be at least 1 second")]
    JailWindow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// sliding window, seconds
    #[serde(default = "default_ban_duration")]
    pub ban_duration: u64,
}

impl Default for JailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: default_max_attempts(),
            ban_duration: default_ban_duration(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserEntry {
    pub username: String,
    pub password: String,
}

/// On-disk configuration document. Everything but the secret has a default.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Auth origin: where proxies send unauthenticated browsers, and the
    /// base for the session cookie domain.
    #[serde(default = "default_origin")]
    pub redirect: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub users: Vec<UserEntry>,
    #[serde(default)]
    pub jail: JailConfig,
    #[serde(default)]
    pub trusted_domains: Vec<String>,
    /// proxies whose `X-Forwarded-For` header is believed for client addressing
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    /// session token lifetime in seconds when "remember" is unset
    #[serde(default = "default_token_ttl")]
    pub token_ttl: u64,
    /// session token lifetime in seconds when "remember" is set
    #[serde(default = "default_remember_ttl")]
    pub remember_ttl: u64,
}

/// Validated runtime configuration, immutable after startup. Components
/// receive it by `Arc`; nothing reads ad hoc globals.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub origin: Url,
    pub secret: SecretString,
    pub users: Vec<User>,
    pub jail: JailConfig,
    pub trusted_domains: Vec<String>,
    pub trusted_proxies: Vec<IpAddr>,
    pub token_ttl: Duration,
    pub remember_ttl: Duration,
}

impl ConfigFile {
    /// # Errors
    /// Any validation failure is fatal at startup.
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let listen: SocketAddr = self
            .listen
            .parse()
            .map_err(|_| ConfigError::Listen(self.listen.clone()))?;

        let origin = Url::parse(&self.redirect)
            .ok()
            .filter(|u| u.host_str().is_some())
            .ok_or_else(|| ConfigError::Origin(self.redirect.clone()))?;

        if self.secret.is_empty() {
            return Err(ConfigError::EmptySecret);
        }

        let mut users: Vec<User> = Vec::with_capacity(self.users.len());
        for entry in self.users {
            if users.iter().any(|u| u.username == entry.username) {
                return Err(ConfigError::DuplicateUser(entry.username));
            }
            users.push(User {
                username: entry.username,
                password: StoredPassword::classify(entry.password),
            });
        }

        if self.jail.enabled {
            if self.jail.max_attempts == 0 {
                return Err(ConfigError::JailAttempts);
            }
            if self.jail.ban_duration == 0 {
                return Err(ConfigError::JailWindow);
            }
        }

        let mut trusted_proxies: Vec<IpAddr> = Vec::with_capacity(self.trusted_proxies.len());
        for proxy in &self.trusted_proxies {
            trusted_proxies.push(
                proxy
                    .parse()
                    .map_err(|_| ConfigError::TrustedProxy(proxy.clone()))?,
            );
        }

        Ok(Config {
            listen,
            origin,
            secret: SecretString::from(self.secret),
            users,
            jail: self.jail,
            trusted_domains: self
                .trusted_domains
                .into_iter()
                .map(|d| d.to_ascii_lowercase())
                .collect(),
            trusted_proxies,
            token_ttl: Duration::from_secs(self.token_ttl),
            remember_ttl: Duration::from_secs(self.remember_ttl),
        })
    }
}

/// Loads the configuration, writing a default document first if the file
/// does not exist yet.
///
/// # Errors
/// I/O, JSON, and validation failures; all fatal before the listener binds.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let path_text = path.display().to_string();

    if !path.exists() {
        let default = default_config_file();
        let data = serde_json::to_string_pretty(&default).map_err(|source| ConfigError::Parse {
            path: path_text.clone(),
            source,
        })?;
        fs::write(path, data).map_err(|source| ConfigError::Io {
            path: path_text.clone(),
            source,
        })?;
        info!("Created default config file: {path_text}");
    }

    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path_text.clone(),
        source,
    })?;
    let file: ConfigFile = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path_text,
        source,
    })?;
    file.into_config()
}

fn default_config_file() -> ConfigFile {
    ConfigFile {
        listen: default_listen(),
        redirect: default_origin(),
        secret: random_secret(),
        users: vec![UserEntry {
            username: "username".to_string(),
            password: "password".to_string(),
        }],
        jail: JailConfig {
            enabled: true,
            max_attempts: default_max_attempts(),
            ban_duration: default_ban_duration(),
        },
        trusted_domains: Vec::new(),
        trusted_proxies: Vec::new(),
        token_ttl: default_token_ttl(),
        remember_ttl: default_remember_ttl(),
    }
}

fn random_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

fn default_listen() -> String {
    "127.0.0.1:9008".to_string()
}

fn default_origin() -> String {
    "http://127.0.0.1:9008".to_string()
}

fn default_max_attempts() -> usize {
    5
}

fn default_ban_duration() -> u64 {
    300
}

fn default_token_ttl() -> u64 {
    3600
}

fn default_remember_ttl() -> u64 {
    30 * 24 * 3600
}
