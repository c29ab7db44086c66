//! Connection parameters handed to a transport.
//!
//! A `ConnectionConfig` is validated once at construction and never mutated
//! afterwards; scenarios only borrow it.

use std::fmt;
use std::time::Duration;

use config::ConfigError;

/// How a client authenticates against the broker.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Credentials {
    #[default]
    None,
    UserPassword { username: String, password: String },
    Token(String),
}

impl Credentials {
    /// Picks a token over a username/password pair. A username without a
    /// password authenticates with an empty password.
    pub fn from_parts(
        username: Option<String>,
        password: Option<String>,
        token: Option<String>,
    ) -> Self {
        match (token, username) {
            (Some(token), _) => Credentials::Token(token),
            (None, Some(username)) => Credentials::UserPassword {
                username,
                password: password.unwrap_or_default(),
            },
            (None, None) => Credentials::None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Credentials::UserPassword { username, .. } => Some(username),
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::None => f.write_str("None"),
            Credentials::UserPassword { username, .. } => f
                .debug_struct("UserPassword")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::Token(_) => f.debug_tuple("Token").field(&"<redacted>").finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    servers: Vec<String>,
    credentials: Credentials,
    connect_timeout: Duration,
}

impl ConnectionConfig {
    /// Fails when `servers` is empty or contains a blank entry.
    pub fn new(
        servers: Vec<String>,
        credentials: Credentials,
        connect_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let servers: Vec<String> = servers.into_iter().map(|s| s.trim().to_string()).collect();
        if servers.is_empty() {
            return Err(ConfigError::Message(
                "no server address configured".to_string(),
            ));
        }
        if servers.iter().any(|s| s.is_empty()) {
            return Err(ConfigError::Message(
                "server address must not be blank".to_string(),
            ));
        }

        Ok(Self {
            servers,
            credentials,
            connect_timeout,
        })
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Same servers and timeout, different identity.
    pub fn with_credentials(&self, credentials: Credentials) -> Self {
        Self {
            servers: self.servers.clone(),
            credentials,
            connect_timeout: self.connect_timeout,
        }
    }
}
