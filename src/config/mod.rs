use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_JWT_ISSUER: &str = "rest-jwt-api";
pub const DEFAULT_JWT_EXPIRY_MINUTES: i64 = 60;
/// One year
pub const MAX_JWT_EXPIRY_MINUTES: i64 = 365 * 24 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JWT_SECRET must be set to a non-empty value")]
    MissingSecret,

    #[error("JWT_ISSUER must not be empty")]
    EmptyIssuer,

    #[error("JWT_EXPIRE_MINUTES must be between 1 and {max}, got {0}", max = MAX_JWT_EXPIRY_MINUTES)]
    ExpiryOutOfRange(i64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    /// HMAC key for signing and verifying tokens
    #[serde(skip_serializing, default)]
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_expiry_minutes: i64,
    pub bcrypt_cost: u32,
}

// Keep the signing key out of logs
impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("enable_cors", &self.enable_cors)
            .field("jwt_secret", &"<redacted>")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("jwt_expiry_minutes", &self.jwt_expiry_minutes)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    /// Reject configurations that would leave protected routes unprotected.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.jwt_secret.is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        if self.security.jwt_issuer.is_empty() {
            return Err(ConfigError::EmptyIssuer);
        }
        let minutes = self.security.jwt_expiry_minutes;
        if !(1..=MAX_JWT_EXPIRY_MINUTES).contains(&minutes) {
            return Err(ConfigError::ExpiryOutOfRange(minutes));
        }
        Ok(())
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Ok(v) = env::var("HOST") {
            self.server.host = v;
        }
        if let Ok(v) = env::var("PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v).filter(|url| !url.is_empty());
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("JWT_ISSUER") {
            self.security.jwt_issuer = v;
        }
        if let Ok(v) = env::var("JWT_EXPIRE_MINUTES") {
            self.security.jwt_expiry_minutes = parse_expiry_minutes(&v);
        }
        if let Ok(v) = env::var("BCRYPT_COST") {
            self.security.bcrypt_cost = v
                .parse::<u32>()
                .map(|cost| cost.clamp(4, 31))
                .unwrap_or(self.security.bcrypt_cost);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: DEFAULT_PORT,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
            },
            security: SecurityConfig::new(""),
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: DEFAULT_PORT,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout: 10,
            },
            security: SecurityConfig::new(""),
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: DEFAULT_PORT,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout: 5,
            },
            security: SecurityConfig::new(""),
        }
    }
}

impl SecurityConfig {
    /// Security settings with the given secret and default issuer, expiry and cost.
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            enable_cors: true,
            jwt_secret: jwt_secret.into(),
            jwt_issuer: DEFAULT_JWT_ISSUER.to_string(),
            jwt_expiry_minutes: DEFAULT_JWT_EXPIRY_MINUTES,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.jwt_issuer = issuer.into();
        self
    }

    pub fn with_expiry_minutes(mut self, minutes: i64) -> Self {
        self.jwt_expiry_minutes = minutes;
        self
    }

    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }
}

/// Token lifetimes must be positive; anything else falls back to the default.
/// Values above the one-year ceiling are kept so `validate()` can reject them.
fn parse_expiry_minutes(raw: &str) -> i64 {
    match raw.trim().parse::<i64>() {
        Ok(minutes) if minutes > 0 => minutes,
        _ => {
            tracing::warn!(
                "JWT_EXPIRE_MINUTES={:?} is not a positive integer, using {}",
                raw,
                DEFAULT_JWT_EXPIRY_MINUTES
            );
            DEFAULT_JWT_EXPIRY_MINUTES
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.security.jwt_expiry_minutes, 60);
        assert_eq!(config.security.jwt_issuer, DEFAULT_JWT_ISSUER);
        assert!(config.database.url.is_none());
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.database.max_connections, 50);
    }

    #[test]
    fn empty_secret_is_rejected() {
        let config = AppConfig::development();
        assert!(matches!(config.validate(), Err(ConfigError::MissingSecret)));

        let mut config = AppConfig::development();
        config.security.jwt_secret = "s3cret".to_string();
        assert!(config.validate().is_ok());

        config.security.jwt_issuer = String::new();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyIssuer)));
    }

    #[test]
    fn expiry_minutes_fall_back_when_not_positive() {
        assert_eq!(parse_expiry_minutes("15"), 15);
        assert_eq!(parse_expiry_minutes(" 90 "), 90);
        assert_eq!(parse_expiry_minutes("0"), DEFAULT_JWT_EXPIRY_MINUTES);
        assert_eq!(parse_expiry_minutes("-5"), DEFAULT_JWT_EXPIRY_MINUTES);
        assert_eq!(parse_expiry_minutes("soon"), DEFAULT_JWT_EXPIRY_MINUTES);
    }

    #[test]
    fn oversized_expiry_fails_validation() {
        let mut config = AppConfig::development();
        config.security.jwt_secret = "s3cret".to_string();

        config.security.jwt_expiry_minutes = parse_expiry_minutes("100000000000");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ExpiryOutOfRange(100_000_000_000))
        ));

        config.security.jwt_expiry_minutes = MAX_JWT_EXPIRY_MINUTES;
        assert!(config.validate().is_ok());

        config.security.jwt_expiry_minutes = MAX_JWT_EXPIRY_MINUTES + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_output_redacts_secret() {
        let security = SecurityConfig::new("top-secret-key");
        let printed = format!("{:?}", security);
        assert!(!printed.contains("top-secret-key"));
        assert!(printed.contains("<redacted>"));
    }
}
