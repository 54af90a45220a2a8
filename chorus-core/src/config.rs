//! Configuration loading for Chorus.
//!
//! Sections other than `[llm]` and `log_filter` are required. Values inside
//! `[cache]` and `[timeouts]` fall back to the defaults below when omitted.

use crate::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable consulted when no config path is given.
pub const CONFIG_ENV_VAR: &str = "CHORUS_CONFIG";

/// Largest cache map size accepted by [`ChorusConfig::validate`].
pub const MAX_MAP_SIZE_MB: usize = 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChorusConfig {
    /// `tracing` filter directive, e.g. `chorus=debug`.
    #[serde(default)]
    pub log_filter: Option<String>,
    pub backend: BackendConfig,
    pub cache: CacheSettings,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    #[serde(default)]
    pub llm: Option<LlmSettings>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    pub url: String,
    /// Public (anonymous) API key of the hosted backend.
    pub anon_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheSettings {
    /// Directory holding the LMDB environment.
    pub path: PathBuf,
    /// Prefix of every cache key; `clear_all` removes exactly this namespace.
    pub namespace: String,
    pub map_size_mb: usize,
    pub collection_ttl_ms: u64,
    pub profile_ttl_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("chorus-cache"),
            namespace: "chorus".to_string(),
            map_size_mb: 64,
            collection_ttl_ms: 10 * 60 * 1000,
            profile_ttl_ms: 30 * 60 * 1000,
        }
    }
}

impl CacheSettings {
    pub fn collection_ttl(&self) -> Duration {
        Duration::from_millis(self.collection_ttl_ms)
    }

    pub fn profile_ttl(&self) -> Duration {
        Duration::from_millis(self.profile_ttl_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TimeoutSettings {
    pub session_ms: u64,
    pub profile_ms: u64,
    pub mutation_ms: u64,
    pub refresh_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            session_ms: 5_000,
            profile_ms: 3_000,
            mutation_ms: 15_000,
            refresh_ms: 10_000,
        }
    }
}

impl TimeoutSettings {
    pub fn session(&self) -> Duration {
        Duration::from_millis(self.session_ms)
    }

    pub fn profile(&self) -> Duration {
        Duration::from_millis(self.profile_ms)
    }

    pub fn mutation(&self) -> Duration {
        Duration::from_millis(self.mutation_ms)
    }

    pub fn refresh(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LlmSettings {
    pub request_timeout_ms: u64,
    pub requests_per_minute: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            requests_per_minute: 50,
        }
    }
}

impl LlmSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl ChorusConfig {
    /// Load from `path`, else from `CHORUS_CONFIG`, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.url.trim().is_empty() {
            return Err(invalid("backend.url", "must not be empty"));
        }
        if !self.backend.url.starts_with("http://") && !self.backend.url.starts_with("https://") {
            return Err(invalid("backend.url", "must be an http(s) URL"));
        }
        if self.backend.anon_key.trim().is_empty() {
            return Err(invalid("backend.anon_key", "must not be empty"));
        }
        if self.cache.path.as_os_str().is_empty() {
            return Err(invalid("cache.path", "must not be empty"));
        }
        if self.cache.namespace.trim().is_empty() {
            return Err(invalid("cache.namespace", "must not be empty"));
        }
        if self.cache.namespace.contains(':') {
            return Err(invalid("cache.namespace", "must not contain ':'"));
        }
        if self.cache.map_size_mb == 0 {
            return Err(invalid("cache.map_size_mb", "must be > 0"));
        }
        if self.cache.map_size_mb > MAX_MAP_SIZE_MB {
            return Err(invalid("cache.map_size_mb", "must be <= 1048576 (1 TiB)"));
        }
        if self.cache.collection_ttl_ms == 0 {
            return Err(invalid("cache.collection_ttl_ms", "must be > 0"));
        }
        if self.cache.profile_ttl_ms == 0 {
            return Err(invalid("cache.profile_ttl_ms", "must be > 0"));
        }
        let timeouts = [
            ("timeouts.session_ms", self.timeouts.session_ms),
            ("timeouts.profile_ms", self.timeouts.profile_ms),
            ("timeouts.mutation_ms", self.timeouts.mutation_ms),
            ("timeouts.refresh_ms", self.timeouts.refresh_ms),
        ];
        for (field, value) in timeouts {
            if value == 0 {
                return Err(invalid(field, "must be > 0"));
            }
        }
        if self.timeouts.profile_ms > self.timeouts.session_ms {
            return Err(invalid("timeouts.profile_ms", "must be <= session_ms"));
        }
        if let Some(llm) = &self.llm {
            if llm.request_timeout_ms == 0 {
                return Err(invalid("llm.request_timeout_ms", "must be > 0"));
            }
            if llm.requests_per_minute == 0 {
                return Err(invalid("llm.requests_per_minute", "must be > 0"));
            }
        }
        Ok(())
    }

    /// Filter directive for the tracing subscriber.
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or("chorus=info")
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from)
}
