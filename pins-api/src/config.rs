//! API Configuration Module
//!
//! CORS, request deadline, result cache backend, and collaborator endpoints.
//! Everything is read from environment variables with development defaults.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pins_storage::{CacheBackend, InMemoryCacheBackend, LmdbCacheBackend};

use crate::error::{ApiError, ApiResult};

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// HTTP-level settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Whether to allow credentials in CORS requests.
    pub cors_allow_credentials: bool,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    /// Deadline for a single request.
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: 86400,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `PINS_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `PINS_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: false)
    /// - `PINS_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `PINS_REQUEST_TIMEOUT_SECS`: Per-request deadline (default: 30)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cors_origins = std::env::var("PINS_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_allow_credentials = std::env::var("PINS_CORS_ALLOW_CREDENTIALS")
            .ok()
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(false);

        let request_timeout = env_parse::<u64>("PINS_REQUEST_TIMEOUT_SECS")
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        Self {
            cors_origins,
            cors_allow_credentials,
            cors_max_age_secs: env_parse("PINS_CORS_MAX_AGE_SECS")
                .unwrap_or(defaults.cors_max_age_secs),
            request_timeout,
        }
    }

    /// Check if running in production mode (strict CORS).
    pub fn is_production(&self) -> bool {
        !self.cors_origins.is_empty()
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }

        self.cors_origins.iter().any(|allowed| {
            if allowed == origin {
                return true;
            }
            // *.example.com matches any https subdomain
            match (allowed.strip_prefix("*."), origin.strip_prefix("https://")) {
                (Some(domain), Some(host)) => {
                    host == domain || host.ends_with(&format!(".{}", domain))
                }
                _ => false,
            }
        })
    }
}

// ============================================================================
// CACHE BACKEND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBackendKind {
    #[default]
    Memory,
    Lmdb,
}

impl std::str::FromStr for CacheBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(CacheBackendKind::Memory),
            "lmdb" => Ok(CacheBackendKind::Lmdb),
            other => Err(format!("Unknown cache backend: {}", other)),
        }
    }
}

/// Which cache backend the result cache sits on.
#[derive(Debug, Clone)]
pub struct CacheBackendConfig {
    pub kind: CacheBackendKind,
    pub path: PathBuf,
    pub max_size_mb: usize,
}

impl Default for CacheBackendConfig {
    fn default() -> Self {
        Self {
            kind: CacheBackendKind::Memory,
            path: PathBuf::from("./data/cache"),
            max_size_mb: 256,
        }
    }
}

impl CacheBackendConfig {
    /// Reads `PINS_CACHE_BACKEND`, `PINS_CACHE_PATH`, `PINS_CACHE_MAX_SIZE_MB`.
    ///
    /// An unrecognized backend name is an error rather than a silent fallback.
    pub fn from_env() -> ApiResult<Self> {
        let defaults = Self::default();
        let kind = match env_non_empty("PINS_CACHE_BACKEND") {
            Some(name) => name.parse().map_err(ApiError::invalid_input)?,
            None => defaults.kind,
        };

        Ok(Self {
            kind,
            path: env_non_empty("PINS_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.path),
            max_size_mb: env_parse("PINS_CACHE_MAX_SIZE_MB").unwrap_or(defaults.max_size_mb),
        })
    }

    pub fn build(&self) -> ApiResult<Arc<dyn CacheBackend>> {
        match self.kind {
            CacheBackendKind::Memory => Ok(Arc::new(InMemoryCacheBackend::new())),
            CacheBackendKind::Lmdb => {
                let backend = LmdbCacheBackend::new(&self.path, self.max_size_mb).map_err(|e| {
                    ApiError::internal_error(format!("Failed to open cache: {}", e))
                })?;
                tracing::info!(path = %self.path.display(), "Using LMDB result cache");
                Ok(Arc::new(backend))
            }
        }
    }
}

// ============================================================================
// COLLABORATORS
// ============================================================================

/// Where file storage and the user directory live.
#[derive(Debug, Clone)]
pub struct CollaboratorConfig {
    /// Base URL of the object storage service. `None` uses the local root.
    pub storage_base_url: Option<String>,
    pub storage_root: PathBuf,
    /// Base URL of the identity service. `None` leaves owners unenriched.
    pub identity_base_url: Option<String>,
    pub timeout: Duration,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            storage_base_url: None,
            storage_root: PathBuf::from("./data/files"),
            identity_base_url: None,
            timeout: Duration::from_secs(5),
        }
    }
}

impl CollaboratorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            storage_base_url: env_non_empty("PINS_STORAGE_BASE_URL"),
            storage_root: env_non_empty("PINS_STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_root),
            identity_base_url: env_non_empty("PINS_IDENTITY_BASE_URL"),
            timeout: env_parse::<u64>("PINS_COLLABORATOR_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}
