//! Certificate Sync Types
//!
//! Core types shared by the workflow, the provider clients and the runner.

/// CDN provider identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Aliyun,
    Qiniu,
}

impl ProviderKind {
    /// All providers, in the order the batch runner visits them
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Aliyun, ProviderKind::Qiniu];
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Aliyun => write!(f, "aliyun"),
            ProviderKind::Qiniu => write!(f, "qiniu"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "aliyun" => Ok(ProviderKind::Aliyun),
            "qiniu" => Ok(ProviderKind::Qiniu),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// Opaque certificate identifier returned by a provider after upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateHandle(String);

impl CertificateHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for CertificateHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A provider-hosted domain discovered by listing the account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeDomain {
    pub name: String,
}

impl EdgeDomain {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Literal, case-sensitive suffix match. No wildcard or SAN awareness.
    pub fn matches_suffix(&self, suffix: &str) -> bool {
        self.name.ends_with(suffix)
    }
}

/// Keep only the domains whose name ends with `suffix`, preserving order
pub fn filter_by_suffix(domains: Vec<EdgeDomain>, suffix: &str) -> Vec<EdgeDomain> {
    domains
        .into_iter()
        .filter(|d| d.matches_suffix(suffix))
        .collect()
}

/// Workflow stage a failure was recorded in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    ReadMaterial,
    Upload,
    Enumerate,
    Bind,
}

impl std::fmt::Display for SyncStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStep::ReadMaterial => write!(f, "read_material"),
            SyncStep::Upload => write!(f, "upload"),
            SyncStep::Enumerate => write!(f, "enumerate"),
            SyncStep::Bind => write!(f, "bind"),
        }
    }
}

/// A single failed step, kept for the end-of-run summary
#[derive(Debug, Clone)]
pub struct StepFailure {
    /// Domain suffix being processed
    pub suffix: String,
    /// Stage that failed
    pub step: SyncStep,
    /// Edge domain or service the step targeted, if any
    pub target: Option<String>,
    /// Human-readable error
    pub message: String,
}

/// Summary of one provider run
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Suffixes the workflow attempted
    pub suffixes_attempted: usize,
    /// Certificates uploaded to the provider's store
    pub certificates_uploaded: usize,
    /// Successful domain bindings
    pub bindings_succeeded: usize,
    /// Every failed step, in order of occurrence
    pub failures: Vec<StepFailure>,
}

impl SyncReport {
    pub fn record(
        &mut self,
        suffix: &str,
        step: SyncStep,
        target: Option<&str>,
        message: impl Into<String>,
    ) {
        self.failures.push(StepFailure {
            suffix: suffix.to_string(),
            step,
            target: target.map(str::to_string),
            message: message.into(),
        });
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Failures recorded for one suffix
    pub fn failures_for<'a>(&'a self, suffix: &'a str) -> impl Iterator<Item = &'a StepFailure> {
        self.failures.iter().filter(move |f| f.suffix == suffix)
    }
}
