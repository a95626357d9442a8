//! Batch Runner
//!
//! Runs each provider's sync as its own child process so a crash or a fatal
//! configuration error in one provider cannot take down another. Providers
//! run one after another, never in parallel.

use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::types::ProviderKind;

/// Outcome of a batch run
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub succeeded: Vec<ProviderKind>,
    pub failed: Vec<ProviderKind>,
}

impl BatchOutcome {
    /// 0 when every provider run succeeded, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.failed.is_empty() {
            0
        } else {
            1
        }
    }
}

/// Spawns `<program> <leading args> sync <provider> <trailing args>` per provider
pub struct BatchRunner {
    program: PathBuf,
    leading_args: Vec<OsString>,
    trailing_args: Vec<OsString>,
}

impl BatchRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            trailing_args: Vec::new(),
        }
    }

    /// Re-invoke the running binary
    pub fn current_exe() -> Result<Self> {
        let program = std::env::current_exe().context("Failed to locate current executable")?;
        Ok(Self::new(program))
    }

    /// Arguments placed before the `sync` subcommand (global flags)
    pub fn leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Arguments placed after the provider name (sync flags)
    pub fn trailing_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.trailing_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Run every provider in order and collect pass/fail
    pub async fn run(&self, providers: &[ProviderKind]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        info!("Starting SSL Sync for all providers...");

        for &provider in providers {
            if self.run_one(provider).await {
                outcome.succeeded.push(provider);
            } else {
                outcome.failed.push(provider);
            }
        }

        if outcome.failed.is_empty() {
            info!("🎉 All providers synced successfully!");
        } else {
            let names: Vec<String> = outcome.failed.iter().map(|p| p.to_string()).collect();
            warn!("⚠️  Summary: The following providers failed: {}", names.join(", "));
        }

        outcome
    }

    async fn run_one(&self, provider: ProviderKind) -> bool {
        info!("🚀 Starting {} sync...", provider);

        let status = tokio::process::Command::new(&self.program)
            .args(&self.leading_args)
            .arg("sync")
            .arg(provider.to_string())
            .args(&self.trailing_args)
            .status()
            .await;

        match status {
            Ok(status) if status.success() => {
                info!("✅ Finished {} successfully.", provider);
                true
            }
            Ok(status) => {
                match status.code() {
                    Some(code) => error!("❌ Finished {} with error (Exit Code: {}).", provider, code),
                    None => error!("❌ {} sync was terminated by a signal.", provider),
                }
                false
            }
            Err(e) => {
                error!("❌ Failed to execute {} sync: {}", provider, e);
                false
            }
        }
    }
}
