use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    /// Seconds before a single request is abandoned and treated as retryable.
    pub request_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub auto_sync: bool,
    pub sync_interval: u64,
    pub max_retry: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub workers: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite:data/casebook.db?mode=rwc".to_string(),
                max_connections: 5,
                connection_timeout: 30,
            },
            remote: RemoteConfig {
                base_url: "http://localhost:8080/api".to_string(),
                request_timeout: 20,
            },
            sync: SyncConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync: true,
            sync_interval: 300, // 5 minutes
            max_retry: 5,
            base_delay_ms: 2_000,
            max_delay_ms: 300_000,
            workers: 4,
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("CASEBOOK_DATABASE_URL") {
            let v = v.trim();
            if !v.is_empty() {
                cfg.database.url = v.to_string();
            }
        }

        if let Ok(v) = std::env::var("CASEBOOK_REMOTE_BASE_URL") {
            let v = v.trim();
            if !v.is_empty() {
                cfg.remote.base_url = v.trim_end_matches('/').to_string();
            }
        }
        if let Some(value) = env_u64("CASEBOOK_REQUEST_TIMEOUT_SECS") {
            cfg.remote.request_timeout = value.max(1);
        }

        if let Ok(v) = std::env::var("CASEBOOK_AUTO_SYNC") {
            cfg.sync.auto_sync = parse_bool(&v, cfg.sync.auto_sync);
        }
        if let Some(value) = env_u64("CASEBOOK_SYNC_INTERVAL_SECS") {
            cfg.sync.sync_interval = value.max(1);
        }
        if let Some(value) = env_u64("CASEBOOK_SYNC_MAX_RETRY") {
            cfg.sync.max_retry = u32::try_from(value).unwrap_or(u32::MAX).max(1);
        }
        if let Some(value) = env_u64("CASEBOOK_SYNC_BASE_DELAY_MS") {
            cfg.sync.base_delay_ms = value;
        }
        if let Some(value) = env_u64("CASEBOOK_SYNC_MAX_DELAY_MS") {
            cfg.sync.max_delay_ms = value;
        }
        if let Some(value) = env_u64("CASEBOOK_SYNC_WORKERS") {
            cfg.sync.workers = usize::try_from(value).unwrap_or(usize::MAX).max(1);
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if !(self.remote.base_url.starts_with("http://")
            || self.remote.base_url.starts_with("https://"))
        {
            return Err("Remote base_url must include http:// or https://".to_string());
        }
        if self.remote.request_timeout == 0 {
            return Err("Remote request_timeout must be greater than 0".to_string());
        }
        if self.sync.max_retry == 0 {
            return Err("Sync max_retry must be greater than 0".to_string());
        }
        if self.sync.workers == 0 {
            return Err("Sync workers must be greater than 0".to_string());
        }
        if self.sync.base_delay_ms > self.sync.max_delay_ms {
            return Err("Sync base_delay_ms must not exceed max_delay_ms".to_string());
        }
        if self.sync.auto_sync && self.sync.sync_interval == 0 {
            return Err("Sync interval must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| parse_u64(&v))
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_inverted_backoff_bounds() {
        let mut cfg = AppConfig::default();
        cfg.sync.base_delay_ms = 10_000;
        cfg.sync.max_delay_ms = 1_000;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_base_url_without_scheme() {
        let mut cfg = AppConfig::default();
        cfg.remote.base_url = "api.example.com".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parse_bool_falls_back_on_unknown_values() {
        assert!(parse_bool("YES", false));
        assert!(!parse_bool("off", true));
        assert!(parse_bool("maybe", true));
    }
}
