//! Qiniu Client
//!
//! Certificates go to the `sslcert` store; HTTPS is then switched on per CDN
//! domain through `httpsconf` with force-HTTPS and HTTP/2 enabled.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use tracing::{debug, info};

use super::{ApiError, EdgeService, MissingMaterialPolicy, ProviderClient, ProviderProfile};
use crate::config::QiniuConfig;
use crate::material::CertificateMaterial;
use crate::naming::CertNaming;
use crate::types::{CertificateHandle, EdgeDomain, ProviderKind};

type HmacSha1 = Hmac<Sha1>;

/// Domains requested per listing call. Only the first page is fetched.
pub const DOMAIN_PAGE_SIZE: u32 = 1000;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// QBox access token for a request.
///
/// Signs `path[?query]\n`, plus the body only for form-encoded requests;
/// JSON bodies are not covered by the signature.
pub fn access_token(
    access_key: &str,
    secret_key: &str,
    url: &Url,
    body: Option<&[u8]>,
    content_type: Option<&str>,
) -> String {
    let mut data = url.path().as_bytes().to_vec();
    if let Some(query) = url.query().filter(|q| !q.is_empty()) {
        data.push(b'?');
        data.extend_from_slice(query.as_bytes());
    }
    data.push(b'\n');
    if let (Some(body), Some(FORM_CONTENT_TYPE)) = (body, content_type) {
        data.extend_from_slice(body);
    }

    let mut mac =
        HmacSha1::new_from_slice(secret_key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(&data);
    let sign = base64::engine::general_purpose::URL_SAFE.encode(mac.finalize().into_bytes());

    format!("{access_key}:{sign}")
}

// ============================================================
// API Types
// ============================================================

#[derive(Debug, Serialize)]
struct UploadCertRequest<'a> {
    name: &'a str,
    common_name: &'a str,
    pri: &'a str,
    ca: &'a str,
}

#[derive(Debug, Deserialize)]
struct UploadCertResponse {
    #[serde(rename = "certID")]
    cert_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HttpsConfRequest<'a> {
    cert_id: &'a str,
    force_https: bool,
    http2_enable: bool,
}

#[derive(Debug, Deserialize)]
struct DomainListResponse {
    #[serde(default)]
    domains: Vec<DomainEntry>,
}

#[derive(Debug, Deserialize)]
struct DomainEntry {
    name: Option<String>,
}

// ============================================================
// Client Implementation
// ============================================================

/// Qiniu certificate store and CDN domains
pub struct QiniuClient {
    http_client: Client,
    access_key: String,
    secret_key: String,
    api_endpoint: String,
}

impl QiniuClient {
    pub fn new(config: &QiniuConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("cdn-cert-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
            api_endpoint: config.api_endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path_and_query: &str) -> Result<Url> {
        let raw = format!("{}{}", self.api_endpoint, path_and_query);
        Url::parse(&raw).with_context(|| format!("Invalid Qiniu URL: {}", raw))
    }

    /// Send a QBox-signed request and return the raw body on HTTP 200
    async fn send<B: Serialize>(
        &self,
        operation: &'static str,
        method: Method,
        path_and_query: &str,
        body: Option<&B>,
    ) -> Result<String> {
        let url = self.url(path_and_query)?;

        let payload = body
            .map(serde_json::to_vec)
            .transpose()
            .context("Failed to serialize Qiniu request")?;

        let content_type = payload.as_ref().map(|_| "application/json");
        let token = access_token(
            &self.access_key,
            &self.secret_key,
            &url,
            payload.as_deref(),
            content_type,
        );

        debug!("Qiniu {} {} {}", operation, method, url);

        let mut request = self
            .http_client
            .request(method, url)
            .header("Authorization", format!("QBox {}", token));

        if let Some(payload) = payload {
            request = request
                .header("Content-Type", "application/json")
                .body(payload);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to call Qiniu {}", operation))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read Qiniu {} response", operation))?;

        if status != reqwest::StatusCode::OK {
            return Err(ApiError::Qiniu {
                operation,
                status: status.as_u16(),
                body: text,
            }
            .into());
        }

        Ok(text)
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: Method,
        path_and_query: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let text = self.send(operation, method, path_and_query, body).await?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse Qiniu {} response", operation))
    }
}

#[async_trait]
impl ProviderClient for QiniuClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Qiniu
    }

    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            naming: CertNaming::UnderscoredEpoch,
            page_size: DOMAIN_PAGE_SIZE,
            missing_material: MissingMaterialPolicy::Skip,
        }
    }

    async fn upload_certificate(
        &self,
        name: &str,
        suffix: &str,
        material: &CertificateMaterial,
    ) -> Result<CertificateHandle> {
        let request = UploadCertRequest {
            name,
            common_name: suffix,
            pri: &material.private_key_pem,
            ca: &material.fullchain_pem,
        };

        let response: UploadCertResponse = self
            .send_json("upload", Method::POST, "/sslcert", Some(&request))
            .await?;

        let handle = CertificateHandle::new(response.cert_id.unwrap_or_default());
        info!("Successfully uploaded certificate: {}, CertID: {}", name, handle);
        Ok(handle)
    }

    fn edge_services(&self) -> Vec<&dyn EdgeService> {
        vec![self]
    }
}

#[async_trait]
impl EdgeService for QiniuClient {
    fn label(&self) -> &str {
        "CDN"
    }

    async fn list_domains(&self, page_size: u32) -> Result<Vec<EdgeDomain>> {
        let response: DomainListResponse = self
            .send_json::<(), _>(
                "list domains",
                Method::GET,
                &format!("/domain?limit={}", page_size),
                None,
            )
            .await?;

        Ok(response
            .domains
            .into_iter()
            .filter_map(|d| d.name)
            .filter(|name| !name.is_empty())
            .map(EdgeDomain::new)
            .collect())
    }

    async fn bind_certificate(
        &self,
        domain: &str,
        handle: &CertificateHandle,
        _cert_name: &str,
    ) -> Result<()> {
        info!(domain = %domain, cert_id = %handle, "Updating HTTPS config");

        let request = HttpsConfRequest {
            cert_id: handle.as_str(),
            force_https: true,
            http2_enable: true,
        };

        self.send(
            "update httpsconf",
            Method::PUT,
            &format!("/domain/{}/httpsconf", domain),
            Some(&request),
        )
        .await?;

        Ok(())
    }
}
