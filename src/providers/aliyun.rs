//! Aliyun (Alibaba Cloud) Client
//!
//! Certificates are uploaded once to CAS and the returned `CertId` is bound
//! to matching CDN and DCDN domains. All three services speak the RPC-style
//! OpenAPI with signature version 1.0 (HMAC-SHA1).

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha1::Sha1;
use tracing::{debug, info};

use super::{ApiError, EdgeService, MissingMaterialPolicy, ProviderClient, ProviderProfile};
use crate::config::AliyunConfig;
use crate::material::CertificateMaterial;
use crate::naming::CertNaming;
use crate::types::{CertificateHandle, EdgeDomain, ProviderKind};

type HmacSha1 = Hmac<Sha1>;

const CAS_VERSION: &str = "2020-04-07";
const CDN_VERSION: &str = "2018-05-10";
const DCDN_VERSION: &str = "2018-01-15";

/// Page size for domain listing. Only the first page is fetched.
pub const DOMAIN_PAGE_SIZE: u32 = 500;

// ============================================================
// Request Signing
// ============================================================

/// RFC 3986 percent-encoding as required by the signature scheme
fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Sorted, percent-encoded `k=v&...` query string
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// `METHOD&%2F&<encoded canonical query>`
pub fn string_to_sign(method: &str, params: &BTreeMap<String, String>) -> String {
    format!(
        "{}&{}&{}",
        method,
        percent_encode("/"),
        percent_encode(&canonical_query(params))
    )
}

/// Base64 HMAC-SHA1 of the string-to-sign, keyed with `secret + "&"`
pub fn sign(secret: &str, method: &str, params: &BTreeMap<String, String>) -> String {
    let mut mac = HmacSha1::new_from_slice(format!("{secret}&").as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(string_to_sign(method, params).as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

// ============================================================
// API Response Types
// ============================================================

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(rename = "Code", default)]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
    #[serde(rename = "RequestId", default)]
    request_id: String,
}

#[derive(Debug, Deserialize)]
struct UploadUserCertificateResponse {
    #[serde(rename = "CertId")]
    cert_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct DescribeDomainsResponse {
    #[serde(rename = "Domains")]
    domains: Option<PageDataWrapper>,
}

#[derive(Debug, Deserialize)]
struct PageDataWrapper {
    #[serde(rename = "PageData", default)]
    page_data: Vec<PageDataDomain>,
}

#[derive(Debug, Deserialize)]
struct PageDataDomain {
    #[serde(rename = "DomainName")]
    domain_name: String,
}

// ============================================================
// RPC Client
// ============================================================

/// Signed RPC caller for one Aliyun service endpoint
struct RpcClient {
    http_client: Client,
    service: &'static str,
    endpoint: String,
    version: &'static str,
    access_key_id: String,
    access_key_secret: String,
}

impl RpcClient {
    fn new(
        http_client: Client,
        service: &'static str,
        endpoint: &str,
        version: &'static str,
        config: &AliyunConfig,
    ) -> Self {
        Self {
            http_client,
            service,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            version,
            access_key_id: config.access_key_id.clone(),
            access_key_secret: config.access_key_secret.clone(),
        }
    }

    /// Call `action` with `params` and decode the JSON body
    async fn call<T: DeserializeOwned>(&self, action: &str, params: &[(&str, String)]) -> Result<T> {
        let mut query: BTreeMap<String, String> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();

        query.insert("Action".into(), action.to_string());
        query.insert("Format".into(), "JSON".into());
        query.insert("Version".into(), self.version.to_string());
        query.insert("AccessKeyId".into(), self.access_key_id.clone());
        query.insert("SignatureMethod".into(), "HMAC-SHA1".into());
        query.insert("SignatureVersion".into(), "1.0".into());
        query.insert("SignatureNonce".into(), uuid::Uuid::new_v4().to_string());
        query.insert(
            "Timestamp".into(),
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        );

        let signature = sign(&self.access_key_secret, "POST", &query);
        let body = format!("{}&Signature={}", canonical_query(&query), percent_encode(&signature));

        debug!("Calling {} {} at {}", self.service, action, self.endpoint);

        let response = self
            .http_client
            .post(format!("{}/", self.endpoint))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to call {} {}", self.service, action))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read {} {} response", self.service, action))?;

        if !status.is_success() {
            let error: RpcErrorBody = serde_json::from_str(&text).unwrap_or(RpcErrorBody {
                code: String::new(),
                message: text.clone(),
                request_id: String::new(),
            });
            return Err(ApiError::Aliyun {
                service: self.service,
                action: action.to_string(),
                status: status.as_u16(),
                code: error.code,
                message: error.message,
                request_id: error.request_id,
            }
            .into());
        }

        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse {} {} response", self.service, action))
    }
}

// ============================================================
// Edge Services
// ============================================================

/// CDN or DCDN: same request shapes, different actions
pub struct AliyunDomainService {
    rpc: RpcClient,
    label: &'static str,
    list_action: &'static str,
    bind_action: &'static str,
}

impl AliyunDomainService {
    fn cdn(http_client: Client, config: &AliyunConfig) -> Self {
        Self {
            rpc: RpcClient::new(http_client, "CDN", &config.cdn_endpoint, CDN_VERSION, config),
            label: "CDN",
            list_action: "DescribeUserDomains",
            bind_action: "SetCdnDomainSSLCertificate",
        }
    }

    fn dcdn(http_client: Client, config: &AliyunConfig) -> Self {
        Self {
            rpc: RpcClient::new(http_client, "DCDN", &config.dcdn_endpoint, DCDN_VERSION, config),
            label: "DCDN",
            list_action: "DescribeDcdnUserDomains",
            bind_action: "SetDcdnDomainSSLCertificate",
        }
    }
}

#[async_trait]
impl EdgeService for AliyunDomainService {
    fn label(&self) -> &str {
        self.label
    }

    async fn list_domains(&self, page_size: u32) -> Result<Vec<EdgeDomain>> {
        let response: DescribeDomainsResponse = self
            .rpc
            .call(
                self.list_action,
                &[
                    ("PageSize", page_size.to_string()),
                    ("PageNumber", "1".to_string()),
                ],
            )
            .await?;

        Ok(response
            .domains
            .map(|d| d.page_data)
            .unwrap_or_default()
            .into_iter()
            .map(|d| EdgeDomain::new(d.domain_name))
            .collect())
    }

    async fn bind_certificate(
        &self,
        domain: &str,
        handle: &CertificateHandle,
        cert_name: &str,
    ) -> Result<()> {
        let cert_id: i64 = handle
            .as_str()
            .parse()
            .with_context(|| format!("CertId {} is not numeric", handle))?;

        info!(domain = %domain, cert_id = %cert_id, "Updating {} cert", self.label);

        let _: serde_json::Value = self
            .rpc
            .call(
                self.bind_action,
                &[
                    ("DomainName", domain.to_string()),
                    ("CertName", cert_name.to_string()),
                    ("CertType", "cas".to_string()),
                    ("SSLProtocol", "on".to_string()),
                    ("CertId", cert_id.to_string()),
                ],
            )
            .await?;

        Ok(())
    }
}

// ============================================================
// Provider Client
// ============================================================

/// Aliyun CAS + CDN + DCDN
pub struct AliyunClient {
    cas: RpcClient,
    cdn: AliyunDomainService,
    dcdn: AliyunDomainService,
}

impl AliyunClient {
    pub fn new(config: &AliyunConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("cdn-cert-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            cas: RpcClient::new(http_client.clone(), "CAS", &config.cas_endpoint, CAS_VERSION, config),
            cdn: AliyunDomainService::cdn(http_client.clone(), config),
            dcdn: AliyunDomainService::dcdn(http_client, config),
        })
    }
}

#[async_trait]
impl ProviderClient for AliyunClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Aliyun
    }

    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            naming: CertNaming::SuffixDateTime,
            page_size: DOMAIN_PAGE_SIZE,
            missing_material: MissingMaterialPolicy::Abort,
        }
    }

    async fn upload_certificate(
        &self,
        name: &str,
        _suffix: &str,
        material: &CertificateMaterial,
    ) -> Result<CertificateHandle> {
        info!("Uploading certificate {} to CAS...", name);

        let response: UploadUserCertificateResponse = self
            .cas
            .call(
                "UploadUserCertificate",
                &[
                    ("Name", name.to_string()),
                    ("Cert", material.fullchain_pem.clone()),
                    ("Key", material.private_key_pem.clone()),
                ],
            )
            .await?;

        let handle = CertificateHandle::new(
            response.cert_id.map(|id| id.to_string()).unwrap_or_default(),
        );
        info!("Successfully uploaded certificate to CAS. CertId: {}", handle);
        Ok(handle)
    }

    fn edge_services(&self) -> Vec<&dyn EdgeService> {
        vec![&self.cdn, &self.dcdn]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_params() -> BTreeMap<String, String> {
        [
            ("Timestamp", "2016-02-23T12:46:24Z"),
            ("Format", "XML"),
            ("AccessKeyId", "testid"),
            ("Action", "DescribeRegions"),
            ("SignatureMethod", "HMAC-SHA1"),
            ("SignatureNonce", "3ee8c1b8-83d3-44af-a94f-4e0ad82fd6cf"),
            ("Version", "2014-05-26"),
            ("SignatureVersion", "1.0"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_string_to_sign() {
        assert_eq!(
            string_to_sign("GET", &doc_params()),
            "GET&%2F&AccessKeyId%3Dtestid%26Action%3DDescribeRegions%26Format%3DXML\
             %26SignatureMethod%3DHMAC-SHA1%26SignatureNonce%3D3ee8c1b8-83d3-44af-a94f-4e0ad82fd6cf\
             %26SignatureVersion%3D1.0%26Timestamp%3D2016-02-23T12%253A46%253A24Z\
             %26Version%3D2014-05-26"
        );
    }

    #[test]
    fn test_signature_matches_published_example() {
        assert_eq!(sign("testsecret", "GET", &doc_params()), "OLeaidS1JvxuMvnyHOwuJ+uX5qY=");
    }

    #[test]
    fn test_canonical_query_encodes_pem() {
        let mut params = BTreeMap::new();
        params.insert("Cert".to_string(), "-----BEGIN CERTIFICATE-----\nA+B/C=".to_string());
        params.insert("Name".to_string(), "a.com_20240101_000000".to_string());

        assert_eq!(
            canonical_query(&params),
            "Cert=-----BEGIN%20CERTIFICATE-----%0AA%2BB%2FC%3D&Name=a.com_20240101_000000"
        );
    }

    #[test]
    fn test_profile() {
        let config = AliyunConfig::new(Some("id".into()), Some("secret".into())).unwrap();
        let client = AliyunClient::new(&config).unwrap();
        let profile = client.profile();

        assert_eq!(profile.naming, CertNaming::SuffixDateTime);
        assert_eq!(profile.page_size, 500);
        assert_eq!(profile.missing_material, MissingMaterialPolicy::Abort);

        let services = client.edge_services();
        let labels: Vec<&str> = services.iter().map(|s| s.label()).collect();
        assert_eq!(labels, vec!["CDN", "DCDN"]);
    }
}
