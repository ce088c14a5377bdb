// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

/// Stratum executor configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite connection URL or file path
    pub database_url: String,
    /// Maximum number of activities running at once
    pub max_parallelism: usize,
    /// User that may always process todos
    pub system_user: String,
    /// Users that may process any todo
    pub superusers: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `STRATUM_DATABASE_URL`: SQLite connection string or path
    ///
    /// Optional (with defaults):
    /// - `STRATUM_MAX_PARALLELISM`: fan-out bound (default: 16)
    /// - `STRATUM_SYSTEM_USER`: todo system user (default: admin)
    /// - `STRATUM_SUPERUSERS`: comma separated list (default: empty)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("STRATUM_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("STRATUM_DATABASE_URL"))?;

        let max_parallelism: usize = std::env::var("STRATUM_MAX_PARALLELISM")
            .unwrap_or_else(|_| "16".to_string())
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::Invalid(
                "STRATUM_MAX_PARALLELISM",
                "must be a positive integer",
            ))?;

        let system_user =
            std::env::var("STRATUM_SYSTEM_USER").unwrap_or_else(|_| "admin".to_string());
        if system_user.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "STRATUM_SYSTEM_USER",
                "must not be empty",
            ));
        }

        let superusers = std::env::var("STRATUM_SUPERUSERS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url,
            max_parallelism,
            system_user,
            superusers,
        })
    }

    /// The SQLite file path behind `database_url`, if it names one.
    pub fn sqlite_path(&self) -> Option<&str> {
        let rest = self
            .database_url
            .strip_prefix("sqlite://")
            .or_else(|| self.database_url.strip_prefix("sqlite:"))
            .unwrap_or(&self.database_url);
        let path = rest.split('?').next().unwrap_or(rest);
        if path.is_empty() || path == ":memory:" {
            None
        } else {
            Some(path)
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
