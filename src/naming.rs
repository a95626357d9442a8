//! Certificate naming rules
//!
//! Every run uploads a fresh certificate, so names only need to be unique per
//! suffix per second. Two runs within the same second collide; that is
//! accepted.

use chrono::{DateTime, TimeZone};

/// Provider-specific rule for naming uploaded certificates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertNaming {
    /// `{suffix}_{YYYYMMDD_HHMMSS}`, suffix kept verbatim (Aliyun CAS)
    SuffixDateTime,
    /// `{suffix with '.' -> '_'}_{unix_seconds}` (Qiniu)
    UnderscoredEpoch,
}

impl CertNaming {
    /// Build the certificate name for `suffix` at time `at`.
    ///
    /// The date-time form renders in `at`'s own time zone.
    pub fn certificate_name<Tz>(&self, suffix: &str, at: &DateTime<Tz>) -> String
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        match self {
            CertNaming::SuffixDateTime => {
                format!("{}_{}", suffix, at.format("%Y%m%d_%H%M%S"))
            }
            CertNaming::UnderscoredEpoch => {
                format!("{}_{}", suffix.replace('.', "_"), at.timestamp())
            }
        }
    }
}
