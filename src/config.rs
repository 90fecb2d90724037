//! Service configuration
//!
//! Loaded from YAML, then overridden from the environment:
//!
//! ```yaml
//! backend: remote
//! remote_url: https://documents.internal/api
//! remote_token_env: TRUST_CACHE_REMOTE_TOKEN
//! rate_limit:
//!   max_requests: 20
//!   window_secs: 60
//! ```

use crate::cache::{
    CacheConfig, CacheStore, FileStore, NullStore, ProfileStore, RemoteStore, DEFAULT_BATCH_LIMIT,
    DEFAULT_MAX_ENTRIES, DEFAULT_RESPONSES_COLLECTION, DEFAULT_USAGE_COLLECTION,
};
use crate::resilience::rate_limiter::{AdmissionController, RateLimitRule};
use crate::transport::HttpDocumentStore;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    File,
    Profile,
    Remote,
    None,
}

impl std::str::FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(BackendKind::File),
            "profile" => Ok(BackendKind::Profile),
            "remote" => Ok(BackendKind::Remote),
            "none" | "off" => Ok(BackendKind::None),
            other => Err(Error::configuration_with_context(
                format!("unknown cache backend '{other}'"),
                ErrorContext::new()
                    .with_field_path("backend")
                    .with_details("expected file, profile, remote or none"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: 20,
            window_secs: 60,
        }
    }
}

impl RateLimitSettings {
    pub fn rule(&self) -> RateLimitRule {
        RateLimitRule::new(self.max_requests, Duration::from_secs(self.window_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustCacheConfig {
    pub enabled: bool,
    pub backend: BackendKind,
    pub file_path: PathBuf,
    pub max_entries: usize,
    pub max_entry_bytes: usize,
    pub profile_root: PathBuf,
    pub profile_id: String,
    pub remote_url: Option<String>,
    /// Name of the environment variable holding the bearer token.
    pub remote_token_env: Option<String>,
    pub remote_batch_limit: usize,
    pub responses_collection: String,
    pub usage_collection: String,
    pub rate_limit: RateLimitSettings,
    pub sweep_interval_secs: u64,
}

impl Default for TrustCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: BackendKind::File,
            file_path: PathBuf::from("ai_cache.json"),
            max_entries: DEFAULT_MAX_ENTRIES,
            max_entry_bytes: CacheConfig::default().max_entry_size,
            profile_root: PathBuf::from("profiles"),
            profile_id: "default".to_string(),
            remote_url: None,
            remote_token_env: None,
            remote_batch_limit: DEFAULT_BATCH_LIMIT,
            responses_collection: DEFAULT_RESPONSES_COLLECTION.to_string(),
            usage_collection: DEFAULT_USAGE_COLLECTION.to_string(),
            rate_limit: RateLimitSettings::default(),
            sweep_interval_secs: 60,
        }
    }
}

impl TrustCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("cannot read config: {e}"),
                ErrorContext::new().with_details(path.display().to_string()),
            )
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = path.into();
        self
    }

    pub fn with_remote_url(mut self, url: impl Into<String>) -> Self {
        self.remote_url = Some(url.into());
        self
    }

    pub fn with_rate_limit(mut self, max_requests: u32, window_secs: u64) -> Self {
        self.rate_limit = RateLimitSettings {
            max_requests,
            window_secs,
        };
        self
    }

    /// Apply `TRUST_CACHE_*` environment overrides.
    pub fn apply_env(mut self) -> Result<Self> {
        if let Ok(backend) = env::var("TRUST_CACHE_BACKEND") {
            self.backend = backend.parse()?;
        }
        if let Ok(path) = env::var("TRUST_CACHE_FILE") {
            self.file_path = PathBuf::from(path);
        }
        if let Ok(url) = env::var("TRUST_CACHE_REMOTE_URL") {
            self.remote_url = Some(url);
        }
        if let Ok(flag) = env::var("TRUST_CACHE_DISABLED") {
            if matches!(flag.trim(), "1" | "true" | "yes") {
                self.enabled = false;
            }
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.max_requests == 0 {
            return Err(invalid("rate_limit.max_requests", "must be at least 1"));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(invalid("rate_limit.window_secs", "must be at least 1"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(invalid("sweep_interval_secs", "must be at least 1"));
        }
        if self.max_entries == 0 {
            return Err(invalid("max_entries", "must be at least 1"));
        }
        if self.remote_batch_limit == 0 {
            return Err(invalid("remote_batch_limit", "must be at least 1"));
        }
        if self.backend == BackendKind::Remote && self.remote_url.is_none() {
            return Err(invalid("remote_url", "required for the remote backend"));
        }
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_enabled(self.enabled && self.backend != BackendKind::None)
            .with_max_entry_size(self.max_entry_bytes)
    }

    /// Construct the configured store.
    pub async fn build_store(&self) -> Result<Box<dyn CacheStore>> {
        self.validate()?;
        if !self.enabled {
            return Ok(Box::new(NullStore::new()));
        }
        let store: Box<dyn CacheStore> = match self.backend {
            BackendKind::None => Box::new(NullStore::new()),
            BackendKind::File => {
                Box::new(FileStore::new(&self.file_path).with_max_entries(self.max_entries))
            }
            BackendKind::Profile => {
                Box::new(ProfileStore::open(&self.profile_root, &self.profile_id).await?)
            }
            BackendKind::Remote => {
                let url = self.remote_url.as_deref().unwrap_or_default();
                let token = self
                    .remote_token_env
                    .as_deref()
                    .and_then(|name| env::var(name).ok());
                let documents = HttpDocumentStore::new(url)?
                    .with_token(token)
                    .with_batch_limit(self.remote_batch_limit);
                Box::new(
                    RemoteStore::new(Arc::new(documents))
                        .with_collections(&self.responses_collection, &self.usage_collection),
                )
            }
        };
        Ok(store)
    }

    pub fn rule(&self) -> RateLimitRule {
        self.rate_limit.rule()
    }

    /// Admission controller with its lapsed-window sweeper running. Must be
    /// called inside a tokio runtime.
    pub fn build_admission(&self) -> Result<Arc<AdmissionController>> {
        self.validate()?;
        let controller = Arc::new(AdmissionController::new());
        // Detached; the task exits once the controller is dropped.
        drop(controller.spawn_sweeper(Duration::from_secs(self.sweep_interval_secs)));
        Ok(controller)
    }
}

fn invalid(field: &str, message: &str) -> Error {
    Error::configuration_with_context(message, ErrorContext::new().with_field_path(field))
}
