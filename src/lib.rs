//! CDN Certificate Sync Library
//!
//! Rotates TLS certificates from local disk onto CDN providers: upload to
//! the provider's certificate store, find the edge domains under each
//! configured suffix, bind the new certificate to every one of them.

pub mod config;
pub mod material;
pub mod naming;
pub mod providers;
pub mod runner;
pub mod types;
pub mod workflow;

pub use config::SyncConfig;
pub use material::CertificateMaterial;
pub use providers::{AliyunClient, EdgeService, ProviderClient, QiniuClient};
pub use runner::BatchRunner;
pub use types::{ProviderKind, SyncReport};
pub use workflow::SyncWorkflow;
