//! Credential & Config Loader
//!
//! Everything the workflow and the clients need is resolved once in `main`
//! into a [`SyncConfig`] and passed down by reference. Nothing below this
//! module reads the process environment.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_BASE_SSL_PATH: &str = "/etc/nginx/ssl";

/// Suffixes synced when `TARGET_DOMAINS` is unset or blank
pub const DEFAULT_TARGET_DOMAINS: [&str; 3] = ["agilestudio.cn", "52cmajor.com", "33subs.com"];

pub const DEFAULT_ALIYUN_CAS_ENDPOINT: &str = "https://cas.aliyuncs.com";
pub const DEFAULT_ALIYUN_CDN_ENDPOINT: &str = "https://cdn.aliyuncs.com";
pub const DEFAULT_ALIYUN_DCDN_ENDPOINT: &str = "https://dcdn.aliyuncs.com";
pub const DEFAULT_QINIU_API_ENDPOINT: &str = "https://api.qiniu.com";

/// Errors raised while resolving configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Please set {0} and {1} environment variables")]
    MissingCredentials(&'static str, &'static str),

    #[error("failed to read env file {}: {source}", .path.display())]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
}

/// Settings shared by every provider run
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory holding `{suffix}.fullchain.cer` and `{suffix}.key`
    pub base_ssl_path: PathBuf,
    /// Domain suffixes to rotate, in order
    pub target_domains: Vec<String>,
    /// Log what would happen without uploading or binding
    pub dry_run: bool,
}

impl SyncConfig {
    pub fn new(base_ssl_path: impl Into<PathBuf>, target_domains: Option<&str>, dry_run: bool) -> Self {
        Self {
            base_ssl_path: base_ssl_path.into(),
            target_domains: parse_target_domains(target_domains),
            dry_run,
        }
    }
}

/// Split a comma-separated suffix list, dropping blanks.
///
/// Falls back to [`DEFAULT_TARGET_DOMAINS`] when the input is absent or
/// contains no usable entry.
pub fn parse_target_domains(raw: Option<&str>) -> Vec<String> {
    let parsed: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect();

    if parsed.is_empty() {
        DEFAULT_TARGET_DOMAINS.iter().map(|d| d.to_string()).collect()
    } else {
        parsed
    }
}

/// Aliyun access key pair and service endpoints
#[derive(Clone)]
pub struct AliyunConfig {
    pub access_key_id: String,
    pub access_key_secret: String,
    pub cas_endpoint: String,
    pub cdn_endpoint: String,
    pub dcdn_endpoint: String,
}

impl std::fmt::Debug for AliyunConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliyunConfig")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"<redacted>")
            .field("cas_endpoint", &self.cas_endpoint)
            .field("cdn_endpoint", &self.cdn_endpoint)
            .field("dcdn_endpoint", &self.dcdn_endpoint)
            .finish()
    }
}

impl AliyunConfig {
    /// Build from raw values, failing when either half of the key pair is
    /// missing or blank.
    pub fn new(access_key_id: Option<String>, access_key_secret: Option<String>) -> Result<Self, ConfigError> {
        let (Some(access_key_id), Some(access_key_secret)) =
            (non_blank(access_key_id), non_blank(access_key_secret))
        else {
            return Err(ConfigError::MissingCredentials(
                "ALIBABA_CLOUD_ACCESS_KEY_ID",
                "ALIBABA_CLOUD_ACCESS_KEY_SECRET",
            ));
        };

        Ok(Self {
            access_key_id,
            access_key_secret,
            cas_endpoint: DEFAULT_ALIYUN_CAS_ENDPOINT.to_string(),
            cdn_endpoint: DEFAULT_ALIYUN_CDN_ENDPOINT.to_string(),
            dcdn_endpoint: DEFAULT_ALIYUN_DCDN_ENDPOINT.to_string(),
        })
    }

    /// Point all three services at other hosts
    pub fn with_endpoints(
        mut self,
        cas: Option<String>,
        cdn: Option<String>,
        dcdn: Option<String>,
    ) -> Self {
        if let Some(cas) = non_blank(cas) {
            self.cas_endpoint = cas;
        }
        if let Some(cdn) = non_blank(cdn) {
            self.cdn_endpoint = cdn;
        }
        if let Some(dcdn) = non_blank(dcdn) {
            self.dcdn_endpoint = dcdn;
        }
        self
    }
}

/// Qiniu access key pair and API endpoint
#[derive(Clone)]
pub struct QiniuConfig {
    pub access_key: String,
    pub secret_key: String,
    pub api_endpoint: String,
}

impl std::fmt::Debug for QiniuConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QiniuConfig")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("api_endpoint", &self.api_endpoint)
            .finish()
    }
}

impl QiniuConfig {
    pub fn new(access_key: Option<String>, secret_key: Option<String>) -> Result<Self, ConfigError> {
        let (Some(access_key), Some(secret_key)) = (non_blank(access_key), non_blank(secret_key))
        else {
            return Err(ConfigError::MissingCredentials(
                "QINIU_ACCESS_KEY",
                "QINIU_SECRET_KEY",
            ));
        };

        Ok(Self {
            access_key,
            secret_key,
            api_endpoint: DEFAULT_QINIU_API_ENDPOINT.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        if let Some(endpoint) = non_blank(endpoint) {
            self.api_endpoint = endpoint;
        }
        self
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Seed the process environment from an env file.
///
/// Variables already set win over the file. Returns `false` when there is no
/// file at `path`. Call before any other thread exists; the values only reach
/// clap `env` fallbacks on a parse that happens after this.
pub fn load_env_file(path: &Path) -> Result<bool, ConfigError> {
    match dotenvy::from_path(path) {
        Ok(()) => {
            info!("Loaded configuration from {}", path.display());
            Ok(true)
        }
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No env file at {}", path.display());
            Ok(false)
        }
        Err(source) => Err(ConfigError::EnvFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}
