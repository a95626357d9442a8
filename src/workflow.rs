//! Certificate Sync Workflow
//!
//! Drives one provider through every configured domain suffix:
//! read material → upload → discover matching edge domains → bind.
//!
//! Failures are isolated at the narrowest scope that still lets the run make
//! progress: a bad bind never stops the other domains, a failed upload only
//! stops its own suffix.

use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::material::{CertificateMaterial, MaterialError};
use crate::providers::{EdgeService, MissingMaterialPolicy, ProviderClient};
use crate::types::{filter_by_suffix, CertificateHandle, EdgeDomain, SyncReport, SyncStep};

/// Wall clock used for certificate names
pub type Clock = Box<dyn Fn() -> DateTime<Local> + Send + Sync>;

/// Errors that end a provider run early
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("certificate material for {suffix} is unusable: {source}")]
    Material {
        suffix: String,
        #[source]
        source: MaterialError,
    },
}

/// Sequential certificate rotation for one provider
pub struct SyncWorkflow<'a> {
    config: &'a SyncConfig,
    client: &'a dyn ProviderClient,
    clock: Clock,
}

impl<'a> SyncWorkflow<'a> {
    pub fn new(config: &'a SyncConfig, client: &'a dyn ProviderClient) -> Self {
        Self {
            config,
            client,
            clock: Box::new(Local::now),
        }
    }

    /// Replace the wall clock, mainly for deterministic certificate names
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Process every configured suffix in order.
    ///
    /// Under [`MissingMaterialPolicy::Abort`] all material is read up front,
    /// so a missing or empty file ends the run before any API call.
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let provider = self.client.kind();
        let suffixes = &self.config.target_domains;
        let mut report = SyncReport::default();

        info!(
            provider = %provider,
            dry_run = self.config.dry_run,
            "Starting SSL certificate sync for suffixes: {:?}",
            suffixes
        );

        let mut preloaded: Vec<Option<CertificateMaterial>> =
            match self.client.profile().missing_material {
                MissingMaterialPolicy::Abort => self.preload()?.into_iter().map(Some).collect(),
                MissingMaterialPolicy::Skip => vec![None; suffixes.len()],
            };

        for (suffix, slot) in suffixes.iter().zip(preloaded.iter_mut()) {
            info!("====== Processing Domain Group: {} ======", suffix);
            report.suffixes_attempted += 1;

            let material = match slot.take() {
                Some(material) => material,
                None => match CertificateMaterial::load(&self.config.base_ssl_path, suffix) {
                    Ok(material) => material,
                    Err(e) => {
                        error!(suffix = %suffix, "Skipping {} due to missing or invalid certificate files: {}", suffix, e);
                        report.record(suffix, SyncStep::ReadMaterial, None, e.to_string());
                        continue;
                    }
                },
            };

            self.sync_domain_group(suffix, material, &mut report).await;
        }

        info!(
            provider = %provider,
            suffixes = report.suffixes_attempted,
            uploaded = report.certificates_uploaded,
            bound = report.bindings_succeeded,
            failures = report.failures.len(),
            "All sync tasks completed"
        );

        Ok(report)
    }

    fn preload(&self) -> Result<Vec<CertificateMaterial>, SyncError> {
        self.config
            .target_domains
            .iter()
            .map(|suffix| {
                CertificateMaterial::load(&self.config.base_ssl_path, suffix).map_err(|source| {
                    error!(suffix = %suffix, "Error: {}", source);
                    SyncError::Material {
                        suffix: suffix.clone(),
                        source,
                    }
                })
            })
            .collect()
    }

    /// Upload one suffix's certificate and bind it everywhere it matches.
    ///
    /// Never fails: every problem is logged and recorded in `report`.
    pub async fn sync_domain_group(
        &self,
        suffix: &str,
        material: CertificateMaterial,
        report: &mut SyncReport,
    ) {
        let profile = self.client.profile();
        let cert_name = profile.naming.certificate_name(suffix, &(self.clock)());

        if self.config.dry_run {
            info!(suffix = %suffix, "DRY RUN - would upload certificate {}", cert_name);
            for service in self.client.edge_services() {
                let domains = self.matching_domains(service, suffix, report).await;
                for domain in &domains {
                    info!(domain = %domain.name, "DRY RUN - would bind {} cert", service.label());
                }
            }
            return;
        }

        info!("--- Uploading Certificate for {} ---", suffix);
        let handle = match self
            .client
            .upload_certificate(&cert_name, suffix, &material)
            .await
        {
            Ok(handle) if !handle.is_empty() => handle,
            Ok(_) => {
                error!(suffix = %suffix, "Failed to get certificate id for {}, skipping...", suffix);
                report.record(suffix, SyncStep::Upload, None, "provider returned an empty certificate id");
                return;
            }
            Err(e) => {
                error!(suffix = %suffix, "Error uploading certificate for {}, skipping this domain group: {:#}", suffix, e);
                report.record(suffix, SyncStep::Upload, None, format!("{:#}", e));
                return;
            }
        };
        drop(material);
        report.certificates_uploaded += 1;

        for service in self.client.edge_services() {
            info!("--- Processing {} for {} ---", service.label(), suffix);
            let domains = self.matching_domains(service, suffix, report).await;

            for domain in &domains {
                self.bind(service, suffix, domain, &handle, &cert_name, report)
                    .await;
            }
        }
    }

    /// One page of the service's domains, filtered by suffix.
    /// Listing errors degrade to zero matches.
    async fn matching_domains(
        &self,
        service: &dyn EdgeService,
        suffix: &str,
        report: &mut SyncReport,
    ) -> Vec<EdgeDomain> {
        let page_size = self.client.profile().page_size;

        let domains = match service.list_domains(page_size).await {
            Ok(domains) => domains,
            Err(e) => {
                error!(suffix = %suffix, "Error fetching {} domains for {}: {:#}", service.label(), suffix, e);
                report.record(
                    suffix,
                    SyncStep::Enumerate,
                    Some(service.label()),
                    format!("{:#}", e),
                );
                return Vec::new();
            }
        };

        if domains.len() >= page_size as usize {
            warn!(
                "{} listing returned a full page of {} domains; matches beyond it are not synced",
                service.label(),
                page_size
            );
        }

        let matching = filter_by_suffix(domains, suffix);
        let names: Vec<&str> = matching.iter().map(|d| d.name.as_str()).collect();
        info!(
            "Found {} matching {} domains: {:?}",
            matching.len(),
            service.label(),
            names
        );
        if matching.is_empty() {
            info!("No {} domains found for suffix {}", service.label(), suffix);
        }

        matching
    }

    async fn bind(
        &self,
        service: &dyn EdgeService,
        suffix: &str,
        domain: &EdgeDomain,
        handle: &CertificateHandle,
        cert_name: &str,
        report: &mut SyncReport,
    ) {
        match service.bind_certificate(&domain.name, handle, cert_name).await {
            Ok(()) => {
                info!(domain = %domain.name, cert_id = %handle, "Successfully updated {} cert for {}", service.label(), domain.name);
                report.bindings_succeeded += 1;
            }
            Err(e) => {
                error!(domain = %domain.name, "Failed to update {} cert for {}: {:#}", service.label(), domain.name, e);
                report.record(
                    suffix,
                    SyncStep::Bind,
                    Some(&domain.name),
                    format!("{:#}", e),
                );
            }
        }
    }
}
