//! Server configuration module
//! Built once at startup and handed by reference to the token codec and the store

use crate::constants::{
    DEFAULT_DB_CONNECT_TIMEOUT_MS, DEFAULT_DB_HOST, DEFAULT_DB_MAX_CONNECTIONS, DEFAULT_HOST,
    DEFAULT_PORT,
};
use crate::error::{AgendaError, Result};
use sqlx::mysql::MySqlConnectOptions;
use std::env;
use std::time::Duration;

/// Connection parameters for the relational store
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Full connection URL, takes precedence over the individual fields
    pub url: Option<String>,
    pub host: String,
    pub user: String,
    pub password: String,
    pub name: String,
    pub connect_timeout: Duration,
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// Connect options for the pool. The individual fields are handed over
    /// as they are, so credentials never need URL escaping.
    pub fn connect_options(&self) -> Result<MySqlConnectOptions> {
        if let Some(url) = &self.url {
            return url.parse().map_err(|e| {
                AgendaError::ConfigError(format!("AGENDA_DATABASE_URL is invalid: {}", e))
            });
        }

        let options = MySqlConnectOptions::new()
            .host(&self.host)
            .username(&self.user)
            .database(&self.name);
        if self.password.is_empty() {
            Ok(options)
        } else {
            Ok(options.password(&self.password))
        }
    }
}

/// Server configuration parameters
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// JWT secret for token signing/validation
    pub jwt_secret: String,
    pub database: DatabaseConfig,
    /// Development mode (logged at startup only)
    pub development_mode: bool,
}

impl ServerConfig {
    /// Create a test configuration - DANGEROUS: Only for testing!
    pub fn for_testing() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            jwt_secret: "unit-test-signing-key-with-enough-length-7f3a9c".to_string(),
            database: DatabaseConfig {
                url: None,
                host: DEFAULT_DB_HOST.to_string(),
                user: "agenda".to_string(),
                password: String::new(),
                name: "agenda_test".to_string(),
                connect_timeout: Duration::from_millis(DEFAULT_DB_CONNECT_TIMEOUT_MS),
                max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            },
            development_mode: true,
        }
    }

    /// Validate that the signing secret meets security requirements
    fn validate_jwt_secret(secret: &str) -> Result<()> {
        if secret.len() < 32 {
            return Err(AgendaError::ConfigError(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }

        // Check for insecure default or example values
        let insecure_patterns = [
            "your-secret-key",
            "change-this",
            "changeme",
            "default",
            "password",
            "12345",
        ];

        for pattern in &insecure_patterns {
            if secret.to_lowercase().contains(pattern) {
                return Err(AgendaError::ConfigError(format!(
                    "JWT secret contains insecure pattern '{}'. Please use a secure random secret generated with: openssl rand -base64 32",
                    pattern
                )));
            }
        }

        if secret.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(AgendaError::ConfigError(
                "JWT secret should contain mixed characters (letters, numbers, symbols)"
                    .to_string(),
            ));
        }

        Ok(())
    }

    fn parse_var<T: std::str::FromStr>(names: &[&str], default: T) -> Result<T> {
        for name in names {
            if let Ok(raw) = env::var(name) {
                return raw.trim().parse().map_err(|_| {
                    AgendaError::ConfigError(format!("{} has an invalid value: {}", name, raw))
                });
            }
        }
        Ok(default)
    }

    fn parse_flag(name: &str) -> bool {
        env::var(name)
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let host = env::var("AGENDA_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = Self::parse_var(&["AGENDA_PORT", "PORT"], DEFAULT_PORT)?;

        let jwt_secret = env::var("AGENDA_JWT_SECRET")
            .or_else(|_| env::var("JWT_SECRET"))
            .map_err(|_| {
                AgendaError::ConfigError(
                    "JWT_SECRET environment variable is required. \
                     Generate one with: openssl rand -base64 32"
                        .to_string(),
                )
            })?;
        Self::validate_jwt_secret(&jwt_secret)?;

        let url = env::var("AGENDA_DATABASE_URL").ok();
        let db_user = env::var("DB_USER").unwrap_or_default();
        let db_name = env::var("DB_NAME").unwrap_or_default();
        if url.is_none() && (db_user.is_empty() || db_name.is_empty()) {
            return Err(AgendaError::ConfigError(
                "Either AGENDA_DATABASE_URL or both DB_USER and DB_NAME must be set".to_string(),
            ));
        }

        let timeout_ms = Self::parse_var(&["DB_TIMEOUT"], DEFAULT_DB_CONNECT_TIMEOUT_MS)?;
        let max_connections =
            Self::parse_var(&["AGENDA_DB_MAX_CONNECTIONS"], DEFAULT_DB_MAX_CONNECTIONS)?;

        let database = DatabaseConfig {
            url,
            host: env::var("DB_HOST").unwrap_or(DEFAULT_DB_HOST.to_string()),
            user: db_user,
            password: env::var("DB_PASSWORD").unwrap_or_default(),
            name: db_name,
            connect_timeout: Duration::from_millis(timeout_ms),
            max_connections,
        };

        Ok(Self {
            host,
            port,
            jwt_secret,
            database,
            development_mode: Self::parse_flag("AGENDA_DEVELOPMENT_MODE"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_testing_has_valid_secret() {
        let config = ServerConfig::for_testing();
        assert!(ServerConfig::validate_jwt_secret(&config.jwt_secret).is_ok());
        assert!(config.development_mode);
    }

    #[test]
    fn test_short_secret_rejected() {
        let err = ServerConfig::validate_jwt_secret("short-1").unwrap_err();
        assert!(err.to_string().contains("at least 32"));
    }

    #[test]
    fn test_placeholder_secret_rejected() {
        let err =
            ServerConfig::validate_jwt_secret("your-secret-key-goes-here-0123456789").unwrap_err();
        assert!(err.to_string().contains("insecure pattern"));
    }

    #[test]
    fn test_alphabetic_secret_rejected() {
        let secret = "abcdefghijklmnopqrstuvwxyzabcdefghij";
        assert!(ServerConfig::validate_jwt_secret(secret).is_err());
    }

    #[test]
    fn test_connect_options_from_fields() {
        let database = ServerConfig::for_testing().database;
        let options = database.connect_options().unwrap();
        assert_eq!(options.get_host(), "localhost");
        assert_eq!(options.get_username(), "agenda");
        assert_eq!(options.get_database(), Some("agenda_test"));
    }

    #[test]
    fn test_password_with_url_delimiters_keeps_host() {
        let mut database = ServerConfig::for_testing().database;
        database.host = "db.internal".to_string();
        database.password = "p@ss#1/x:y".to_string();

        let options = database.connect_options().unwrap();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 3306);
        assert_eq!(options.get_username(), "agenda");
        assert_eq!(options.get_database(), Some("agenda_test"));
    }

    #[test]
    fn test_url_takes_precedence() {
        let mut database = ServerConfig::for_testing().database;
        database.url = Some("mysql://root@db:3307/cal".to_string());
        let options = database.connect_options().unwrap();
        assert_eq!(options.get_host(), "db");
        assert_eq!(options.get_port(), 3307);
        assert_eq!(options.get_database(), Some("cal"));

        database.url = Some("not a url".to_string());
        assert!(database.connect_options().is_err());
    }
}
