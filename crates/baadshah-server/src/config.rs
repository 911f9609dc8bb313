use std::env;

use crate::models::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

impl StorageBackend {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "memory" | "mem" => Some(Self::Memory),
            _ => None,
        }
    }
}

fn parse_initial_balance(raw: &str) -> Option<Money> {
    raw.trim()
        .parse::<Money>()
        .ok()
        .filter(|m| *m >= Money::ZERO)
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub storage_backend: StorageBackend,
    pub sqlite_path: String,
    pub cors_origin: String,
    pub secure_cookies: bool,
    pub session_ttl_hours: i64,
    pub initial_balance: Money,
    pub rate_limit_enabled: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()
                .expect("SERVER_PORT must be a valid port number"),
            storage_backend: env::var("STORAGE_BACKEND")
                .ok()
                .map(|v| {
                    StorageBackend::parse(&v)
                        .expect("STORAGE_BACKEND must be one of: sqlite, memory")
                })
                .unwrap_or(StorageBackend::Sqlite),
            sqlite_path: env::var("SQLITE_PATH")
                .unwrap_or_else(|_| "./data/baadshah.db".to_string()),
            cors_origin: env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            secure_cookies: env::var("SECURE_COOKIES")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            session_ttl_hours: env::var("SESSION_TTL_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .expect("SESSION_TTL_HOURS must be a whole number of hours"),
            // Remote-database deployments open accounts empty; set 1000 for the demo preset.
            initial_balance: parse_initial_balance(
                &env::var("INITIAL_BALANCE").unwrap_or_else(|_| "0".to_string()),
            )
            .expect("INITIAL_BALANCE must be a non-negative decimal amount"),
            rate_limit_enabled: env::var("RATE_LIMIT_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
        }
    }
}

#[cfg(test)]
impl Config {
    /// In-memory configuration for tests; no environment reads.
    pub fn for_tests() -> Self {
        Self {
            server_port: 0,
            storage_backend: StorageBackend::Memory,
            sqlite_path: String::new(),
            cors_origin: "http://localhost:3000".to_string(),
            secure_cookies: false,
            session_ttl_hours: 24,
            initial_balance: Money::ZERO,
            rate_limit_enabled: false,
        }
    }
}
