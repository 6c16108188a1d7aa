use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;

use crate::retry::Backoff;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub session_ttl: usize,

    // Rate limiting
    pub rate_signin_per_min: u32,
    pub rate_signup_per_min: u32,
    pub rate_reset_per_min: u32,
    pub rate_protected_per_min: u32,
    /// Backend-side quota on auth calls; exceeding it yields `RateLimited`.
    pub gateway_auth_per_min: u32,

    // Password reset backoff
    pub reset_max_attempts: u32,
    pub reset_base_delay_ms: u64,

    pub api_prefix: String,
}

fn var_or<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{} must be a valid number, got {:?}", name, raw)),
        Err(_) => default,
    }
}

impl Config {
    /// Defaults for everything but the three required settings.
    pub fn new(server_addr: &str, database_url: &str, jwt_secret: &str) -> Self {
        Self {
            server_addr: server_addr.to_string(),
            database_url: database_url.to_string(),
            jwt_secret: jwt_secret.to_string(),
            session_ttl: 28_800, // 8 hours
            rate_signin_per_min: 30,
            rate_signup_per_min: 10,
            rate_reset_per_min: 5,
            rate_protected_per_min: 1000,
            gateway_auth_per_min: 60,
            reset_max_attempts: 5,
            reset_base_delay_ms: 1000,
            api_prefix: "/api".to_string(),
        }
    }

    pub fn from_env() -> Self {
        dotenv().ok();

        let defaults = Self::new(
            &env::var("SERVER_ADDR").expect("SERVER_ADDR must be set"),
            &env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            &env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
        );

        Self {
            session_ttl: var_or("SESSION_TTL", defaults.session_ttl),
            rate_signin_per_min: var_or("RATE_SIGNIN_PER_MIN", defaults.rate_signin_per_min),
            rate_signup_per_min: var_or("RATE_SIGNUP_PER_MIN", defaults.rate_signup_per_min),
            rate_reset_per_min: var_or("RATE_RESET_PER_MIN", defaults.rate_reset_per_min),
            rate_protected_per_min: var_or(
                "RATE_PROTECTED_PER_MIN",
                defaults.rate_protected_per_min,
            ),
            gateway_auth_per_min: var_or("GATEWAY_AUTH_PER_MIN", defaults.gateway_auth_per_min),
            reset_max_attempts: var_or("RESET_MAX_ATTEMPTS", defaults.reset_max_attempts),
            reset_base_delay_ms: var_or("RESET_BASE_DELAY_MS", defaults.reset_base_delay_ms),
            api_prefix: env::var("API_PREFIX").unwrap_or(defaults.api_prefix.clone()),
            ..defaults
        }
    }

    pub fn reset_backoff(&self) -> Backoff {
        Backoff::new(
            self.reset_max_attempts,
            Duration::from_millis(self.reset_base_delay_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backoff_is_one_second_five_times() {
        let config = Config::new("127.0.0.1:8080", "mysql://localhost/attendance", "secret");
        assert_eq!(config.reset_backoff(), Backoff::default());
        assert_eq!(config.api_prefix, "/api");
    }
}
