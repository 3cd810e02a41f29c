use anyhow::anyhow;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub port: u16,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub lockout: LockoutConfig,
    pub rate_limit: RateLimitConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub private_key_path: String,
    pub public_key_path: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

#[derive(Debug, Clone)]
pub struct LockoutConfig {
    /// Failed attempts that transition an identity to Locked.
    pub max_failed_attempts: i32,
    /// How long a lock holds before it becomes advisory.
    pub lockout_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    /// Holders of this role code see every branch.
    pub admin_role_code: String,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str.parse().map_err(|e: String| anyhow!(e))?;

        let is_prod = environment == Environment::Prod;

        let config = Config {
            environment,
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            port: get_env("PORT", Some("8080"), is_prod)?
                .parse()
                .map_err(|e: std::num::ParseIntError| anyhow!(e.to_string()))?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: get_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?
                    .parse()
                    .unwrap_or(10),
            },
            jwt: JwtConfig {
                private_key_path: get_env("JWT_PRIVATE_KEY_PATH", None, is_prod)?,
                public_key_path: get_env("JWT_PUBLIC_KEY_PATH", None, is_prod)?,
                access_token_expiry_minutes: get_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    Some("15"),
                    is_prod,
                )?
                .parse()
                .map_err(|e: std::num::ParseIntError| anyhow!(e.to_string()))?,
                refresh_token_expiry_days: get_env(
                    "JWT_REFRESH_TOKEN_EXPIRY_DAYS",
                    Some("7"),
                    is_prod,
                )?
                .parse()
                .map_err(|e: std::num::ParseIntError| anyhow!(e.to_string()))?,
            },
            lockout: LockoutConfig {
                max_failed_attempts: get_env("LOCKOUT_MAX_FAILED_ATTEMPTS", Some("5"), is_prod)?
                    .parse()
                    .unwrap_or(5),
                lockout_minutes: get_env("LOCKOUT_DURATION_MINUTES", Some("30"), is_prod)?
                    .parse()
                    .unwrap_or(30),
            },
            rate_limit: RateLimitConfig {
                login_attempts: get_env("RATE_LIMIT_LOGIN_ATTEMPTS", Some("5"), is_prod)?
                    .parse()
                    .unwrap_or(5),
                login_window_seconds: get_env(
                    "RATE_LIMIT_LOGIN_WINDOW_SECONDS",
                    Some("900"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(900),
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
                admin_role_code: get_env("SECURITY_ADMIN_ROLE", Some("SUPER_ADMIN"), is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.port == 0 {
            return Err(anyhow!("PORT must be greater than 0"));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(anyhow!("JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"));
        }

        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(anyhow!("JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive"));
        }

        if self.lockout.max_failed_attempts <= 0 {
            return Err(anyhow!("LOCKOUT_MAX_FAILED_ATTEMPTS must be positive"));
        }

        if self.environment == Environment::Prod
            && self.security.allowed_origins.iter().any(|o| o == "*")
        {
            return Err(anyhow!("Wildcard CORS origin not allowed in production"));
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, anyhow::Error> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => match default {
            // Production requires every variable to be set explicitly
            Some(default) if !is_prod => Ok(default.to_string()),
            _ => Err(anyhow!("Missing required environment variable: {key}")),
        },
    }
}
