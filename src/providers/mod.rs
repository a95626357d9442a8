//! CDN Provider Adapters
//!
//! Trait-based abstractions over each provider's certificate store and the
//! edge services that bind an uploaded certificate to hosted domains.

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::material::CertificateMaterial;
use crate::naming::CertNaming;
use crate::types::{CertificateHandle, EdgeDomain, ProviderKind};

pub mod aliyun;
pub mod qiniu;

pub use aliyun::AliyunClient;
pub use qiniu::QiniuClient;

/// Error payloads returned by provider APIs
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{service} {action} failed ({status}): {code}: {message} (RequestId: {request_id})")]
    Aliyun {
        service: &'static str,
        action: String,
        status: u16,
        code: String,
        message: String,
        request_id: String,
    },

    #[error("Qiniu {operation} failed. Status: {status}, Response: {body}")]
    Qiniu {
        operation: &'static str,
        status: u16,
        body: String,
    },
}

/// What to do when a suffix's certificate or key file is missing or empty
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingMaterialPolicy {
    /// Stop the provider run before any network call
    Abort,
    /// Record the suffix as failed and move on to the next one
    Skip,
}

/// Provider quirks the workflow needs to honour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderProfile {
    pub naming: CertNaming,
    /// Domains fetched per listing call. Only one page is ever requested.
    pub page_size: u32,
    pub missing_material: MissingMaterialPolicy,
}

/// A service that hosts edge domains and can bind certificates to them
#[async_trait]
pub trait EdgeService: Send + Sync {
    /// Short label used in logs (e.g. "CDN", "DCDN")
    fn label(&self) -> &str;

    /// List the account's domains, one page of at most `page_size` entries
    async fn list_domains(&self, page_size: u32) -> Result<Vec<EdgeDomain>>;

    /// Bind an uploaded certificate to `domain` and enable HTTPS
    async fn bind_certificate(
        &self,
        domain: &str,
        handle: &CertificateHandle,
        cert_name: &str,
    ) -> Result<()>;
}

/// Trait for a CDN provider: one certificate store, one or more edge services
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Get the provider type
    fn kind(&self) -> ProviderKind;

    /// Naming, paging and failure quirks
    fn profile(&self) -> ProviderProfile;

    /// Upload certificate material under `name`. `suffix` doubles as the
    /// common name for providers that ask for one.
    async fn upload_certificate(
        &self,
        name: &str,
        suffix: &str,
        material: &CertificateMaterial,
    ) -> Result<CertificateHandle>;

    /// Edge services that should receive the uploaded certificate
    fn edge_services(&self) -> Vec<&dyn EdgeService>;
}
