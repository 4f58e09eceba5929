use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::keys::VIEW_TTL;
use crate::clock::StudyZone;
use crate::services::DEFAULT_MIN_SESSION_SECONDS;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    /// Daily rolling log files go here when set.
    pub log_dir: Option<PathBuf>,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    pub study_zone: StudyZone,
    pub min_session_seconds: i64,
    pub jwt_secret: Option<String>,
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn is_truthy(value: &str) -> bool {
    value == "true" || value == "1"
}

/// `LOG_DIR` (default `./logs`) when `ENABLE_FILE_LOGS` is truthy.
fn file_log_dir(enabled: Option<&str>, dir: Option<String>) -> Option<PathBuf> {
    enabled
        .filter(|v| is_truthy(v))
        .map(|_| PathBuf::from(dir.unwrap_or_else(|| "./logs".to_string())))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_opt(key).and_then(|value| value.parse::<T>().ok())
}

impl Config {
    pub fn from_env() -> Self {
        let port = env_parse::<u16>("PORT").unwrap_or(3000);

        let host = env_parse::<IpAddr>("HOST").unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let log_dir = file_log_dir(env_opt("ENABLE_FILE_LOGS").as_deref(), env_opt("LOG_DIR"));

        let cache_enabled = env_opt("CACHE_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let cache_ttl = env_parse::<u64>("CACHE_TTL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(VIEW_TTL);

        let study_zone = env_parse::<i32>("STUDY_UTC_OFFSET_MINUTES")
            .and_then(StudyZone::from_offset_minutes)
            .unwrap_or_default();

        let min_session_seconds =
            env_parse::<i64>("MIN_SESSION_SECONDS").unwrap_or(DEFAULT_MIN_SESSION_SECONDS);

        Self {
            host,
            port,
            log_level,
            log_dir,
            database_url: env_opt("DATABASE_URL"),
            redis_url: env_opt("REDIS_URL"),
            cache_enabled,
            cache_ttl,
            study_zone,
            min_session_seconds,
            jwt_secret: env_opt("JWT_SECRET"),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
