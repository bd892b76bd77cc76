//! Environment-driven process configuration.

use std::env;

const DEFAULT_DB_PATH: &str = "tinyfaas.sqlite3";
const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Server configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: String,
    /// Address the HTTP server binds to.
    pub addr: String,
}

impl Config {
    /// Load configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("TINYFAAS_DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string()),
            addr: env::var("TINYFAAS_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string()),
        }
    }

    /// The `sqlx` connection URL for the configured database file.
    ///
    /// `mode=rwc` creates the file on first connect, matching the
    /// original service's "just works" first-run experience.
    pub fn db_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        // SAFETY: test-only, no other test in this module touches these vars.
        unsafe {
            env::remove_var("TINYFAAS_DB_PATH");
            env::remove_var("TINYFAAS_ADDR");
        }
        let config = Config::from_env();
        assert_eq!(config.db_path, DEFAULT_DB_PATH);
        assert_eq!(config.addr, DEFAULT_ADDR);
        assert_eq!(config.db_url(), "sqlite://tinyfaas.sqlite3?mode=rwc");
    }
}
