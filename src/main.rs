//! CDN Certificate Sync Agent
//!
//! Batch job that pushes renewed certificates from disk to Aliyun and Qiniu
//! CDN domains. Meant to run from cron or a Kubernetes CronJob.
//!
//! # Usage
//! ```bash
//! # One provider
//! cdn-cert-sync sync aliyun --base-ssl-path /etc/nginx/ssl
//!
//! # Every provider, each in its own process
//! cdn-cert-sync all
//!
//! # See what would be bound without touching anything
//! cdn-cert-sync sync qiniu --target-domains example.com --dry-run
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cdn_cert_sync::config::{self, AliyunConfig, QiniuConfig, DEFAULT_BASE_SSL_PATH};
use cdn_cert_sync::{
    AliyunClient, BatchRunner, ProviderClient, ProviderKind, QiniuClient, SyncConfig, SyncWorkflow,
};

// ============================================================
// CLI Definition
// ============================================================

#[derive(Parser, Debug)]
#[command(name = "cdn-cert-sync", version, about = "Rotate TLS certificates across CDN providers")]
struct Cli {
    /// Env file seeding variables that are not already set
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rotate certificates for a single provider
    Sync {
        /// Provider to sync (aliyun, qiniu)
        provider: ProviderKind,

        #[command(flatten)]
        sync: SyncArgs,

        #[command(flatten)]
        credentials: CredentialArgs,
    },

    /// Run every provider's sync in its own process
    All {
        /// Providers to run, in order
        #[arg(long, value_delimiter = ',', default_value = "aliyun,qiniu")]
        providers: Vec<ProviderKind>,

        #[command(flatten)]
        sync: SyncArgs,
    },
}

#[derive(Args, Debug)]
struct SyncArgs {
    /// Directory holding {suffix}.fullchain.cer and {suffix}.key
    #[arg(long, env = "BASE_SSL_PATH", default_value = DEFAULT_BASE_SSL_PATH)]
    base_ssl_path: PathBuf,

    /// Comma-separated domain suffixes (defaults to the built-in list)
    #[arg(long, env = "TARGET_DOMAINS")]
    target_domains: Option<String>,

    /// Read, list and match, but do not upload or bind
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct CredentialArgs {
    #[arg(long, env = "ALIBABA_CLOUD_ACCESS_KEY_ID", hide_env_values = true)]
    aliyun_access_key_id: Option<String>,

    #[arg(long, env = "ALIBABA_CLOUD_ACCESS_KEY_SECRET", hide_env_values = true)]
    aliyun_access_key_secret: Option<String>,

    #[arg(long, env = "ALIYUN_CAS_ENDPOINT")]
    aliyun_cas_endpoint: Option<String>,

    #[arg(long, env = "ALIYUN_CDN_ENDPOINT")]
    aliyun_cdn_endpoint: Option<String>,

    #[arg(long, env = "ALIYUN_DCDN_ENDPOINT")]
    aliyun_dcdn_endpoint: Option<String>,

    #[arg(long, env = "QINIU_ACCESS_KEY", hide_env_values = true)]
    qiniu_access_key: Option<String>,

    #[arg(long, env = "QINIU_SECRET_KEY", hide_env_values = true)]
    qiniu_secret_key: Option<String>,

    #[arg(long, env = "QINIU_API_ENDPOINT")]
    qiniu_api_endpoint: Option<String>,
}

// ============================================================
// Main Entry Point
// ============================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.log_format) {
        eprintln!("{:#}", e);
        return ExitCode::FAILURE;
    }

    // The env file mutates the process environment, so it is loaded while
    // this is still the only thread.
    if let Err(e) = config::load_env_file(&cli.env_file) {
        error!("{}", e);
        return ExitCode::FAILURE;
    }

    // Parse again so values seeded from the env file reach the `env` fallbacks.
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool, format: LogFormat) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Sync {
            provider,
            sync,
            credentials,
        } => run_sync(provider, sync, credentials).await,

        Commands::All { providers, sync } => {
            let mut leading: Vec<String> = vec![
                "--env-file".into(),
                cli.env_file.display().to_string(),
                "--log-format".into(),
                match cli.log_format {
                    LogFormat::Text => "text".into(),
                    LogFormat::Json => "json".into(),
                },
            ];
            if cli.verbose {
                leading.push("--verbose".into());
            }

            let mut trailing: Vec<String> = vec![
                "--base-ssl-path".into(),
                sync.base_ssl_path.display().to_string(),
            ];
            if let Some(domains) = sync.target_domains {
                trailing.push("--target-domains".into());
                trailing.push(domains);
            }
            if sync.dry_run {
                trailing.push("--dry-run".into());
            }

            let outcome = BatchRunner::current_exe()?
                .leading_args(leading)
                .trailing_args(trailing)
                .run(&providers)
                .await;

            Ok(ExitCode::from(outcome.exit_code() as u8))
        }
    }
}

async fn run_sync(
    provider: ProviderKind,
    sync: SyncArgs,
    credentials: CredentialArgs,
) -> Result<ExitCode> {
    let config = SyncConfig::new(sync.base_ssl_path, sync.target_domains.as_deref(), sync.dry_run);

    info!(
        provider = %provider,
        base_ssl_path = %config.base_ssl_path.display(),
        "🚀 Starting SSL Certificate Sync"
    );

    let client: Box<dyn ProviderClient> = match provider {
        ProviderKind::Aliyun => {
            let aliyun = AliyunConfig::new(
                credentials.aliyun_access_key_id,
                credentials.aliyun_access_key_secret,
            )?
            .with_endpoints(
                credentials.aliyun_cas_endpoint,
                credentials.aliyun_cdn_endpoint,
                credentials.aliyun_dcdn_endpoint,
            );
            Box::new(AliyunClient::new(&aliyun)?)
        }
        ProviderKind::Qiniu => {
            let qiniu = QiniuConfig::new(credentials.qiniu_access_key, credentials.qiniu_secret_key)?
                .with_endpoint(credentials.qiniu_api_endpoint);
            Box::new(QiniuClient::new(&qiniu)?)
        }
    };

    let report = SyncWorkflow::new(&config, client.as_ref()).run().await?;

    if report.is_success() {
        info!("✅ {} sync finished without failures", provider);
        return Ok(ExitCode::SUCCESS);
    }

    for failure in &report.failures {
        warn!(
            suffix = %failure.suffix,
            step = %failure.step,
            target = failure.target.as_deref().unwrap_or("-"),
            "{}",
            failure.message
        );
    }
    warn!(
        "⚠️  {} sync finished with {} failed step(s)",
        provider,
        report.failures.len()
    );

    Ok(ExitCode::FAILURE)
}
