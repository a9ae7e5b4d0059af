//! Configuration module for the EDA backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Directory where project archives are stored
    pub archive_dir: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    /// Git executable used to clone projects
    pub git_bin: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let db_path = env::var("EDA_DB_PATH")
            .unwrap_or_else(|_| "./data/eda.sqlite".to_string())
            .into();

        let archive_dir = env::var("EDA_ARCHIVE_DIR")
            .unwrap_or_else(|_| "./data/archives".to_string())
            .into();

        let bind_addr = env::var("EDA_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8000".to_string())
            .parse()
            .expect("Invalid EDA_BIND_ADDR format");

        let log_level = env::var("EDA_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_format = match env::var("EDA_LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        let git_bin = env::var("EDA_GIT_BIN").unwrap_or_else(|_| "git".to_string());

        Self {
            db_path,
            archive_dir,
            bind_addr,
            log_level,
            log_format,
            git_bin,
        }
    }
}
