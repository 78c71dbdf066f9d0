use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use fstransfer_backend::{BackendRegistry, FilesystemBackend, InMemoryBackend, StorageBackend};
use fstransfer_contract::{NewTransferRequest, RequestId, RequestStatus};
use fstransfer_engine::{
    DueJobSelector, LoggingListener, RetryPolicy, TracingAlertSender, TransferExecutor,
    TransferRunner, TransferSettings,
};
use fstransfer_storage::{ErrorStore, FsTransferStorage, RequestStore, StorageConfig};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about = "File storage transfer scheduler")]
struct Cli {
    #[arg(long, global = true, default_value = "config/fstransfer.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute every due request once, or every `--watch` seconds until Ctrl-C.
    Run {
        #[arg(long)]
        watch: Option<u64>,
    },
    /// Queue a new transfer request.
    Enqueue {
        #[arg(long)]
        old_file_key: String,
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: String,
        #[arg(long, default_value = "")]
        context: String,
        #[arg(long)]
        contact_mail: Option<String>,
    },
    /// List requests, optionally filtered by status or ids.
    List {
        #[arg(long, value_parser = parse_status)]
        status: Option<RequestStatus>,
        #[arg(long, value_delimiter = ',')]
        ids: Vec<RequestId>,
    },
    /// Show the error records of one request.
    Errors { id: RequestId },
    /// Put one request back to TODO with a zero retry count.
    Reset { id: RequestId },
    /// Reset every request in ERROR.
    ResetErrors,
    /// Delete a request and its error records.
    Delete { id: RequestId },
    /// Execute one request now regardless of its execution time.
    Play { id: RequestId },
}

#[derive(Debug, Clone, Deserialize)]
struct RuntimeConfig {
    storage: StorageSection,
    #[serde(flatten)]
    settings: TransferSettings,
    #[serde(default)]
    providers: Vec<ProviderSection>,
}

#[derive(Debug, Clone, Deserialize)]
struct StorageSection {
    sqlite_path: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ProviderKind {
    Filesystem,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
struct ProviderSection {
    name: String,
    kind: ProviderKind,
    root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let storage = Arc::new(open_storage(&config).await?);

    match cli.command {
        Command::Run { watch } => run(&config, storage, watch).await,
        Command::Enqueue {
            old_file_key,
            source,
            target,
            context,
            contact_mail,
        } => {
            let mut request =
                NewTransferRequest::new(old_file_key, source, target).with_context(context);
            if let Some(mail) = contact_mail {
                request = request.with_contact_mail(mail);
            }
            let created = storage.create(request, Utc::now()).await?;
            info!(request_id = created.id, "transfer request queued");
            print_json(&created)
        }
        Command::List { status, ids } => {
            let requests = match (status, ids.is_empty()) {
                (Some(status), true) => storage.list_by_status(status).await?,
                (None, false) => storage.list_by_ids(&ids).await?,
                (None, true) => storage.list_all().await?,
                (Some(_), false) => bail!("--status and --ids cannot be combined"),
            };
            print_json(&requests)
        }
        Command::Errors { id } => print_json(&storage.list_errors_by_request(id).await?),
        Command::Reset { id } => match storage.reset(id, Utc::now()).await? {
            Some(request) if request.status == RequestStatus::Done => {
                bail!("request {id} is DONE and cannot be reset")
            }
            Some(request) => print_json(&request),
            None => bail!("request {id} not found"),
        },
        Command::ResetErrors => {
            let count = storage.reset_all_errors(Utc::now()).await?;
            print_json(&serde_json::json!({ "reset": count }))
        }
        Command::Delete { id } => {
            if !storage.delete(id).await? {
                bail!("request {id} not found");
            }
            info!(request_id = id, "transfer request deleted");
            Ok(())
        }
        Command::Play { id } => {
            let runner = build_runner(&config, storage)?;
            let outcome = runner.play_now(id, Utc::now()).await?;
            print_json(&PlayReport {
                outcome: format!("{:?}", outcome.kind),
                request: &outcome.request,
                error_code: outcome.error.as_ref().map(|error| error.code),
            })
        }
    }
}

#[derive(Serialize)]
struct PlayReport<'a> {
    outcome: String,
    request: &'a fstransfer_contract::TransferRequest,
    error_code: Option<i32>,
}

fn load_config(path: &Path) -> Result<RuntimeConfig> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&source).with_context(|| format!("invalid config TOML at {}", path.display()))
}

async fn open_storage(config: &RuntimeConfig) -> Result<FsTransferStorage> {
    let sqlite_path = &config.storage.sqlite_path;
    // Plain paths get their directory created; sqlite: URIs are used as given.
    if !sqlite_path.starts_with("sqlite:") {
        if let Some(parent) = Path::new(sqlite_path)
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    FsTransferStorage::connect(&StorageConfig {
        sqlite_path: sqlite_path.clone(),
    })
    .await
}

fn build_registry(providers: &[ProviderSection]) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    for provider in providers {
        let backend: Arc<dyn StorageBackend> = match provider.kind {
            ProviderKind::Filesystem => {
                let root = provider.root.clone().ok_or_else(|| {
                    anyhow!("filesystem provider {} requires root", provider.name)
                })?;
                Arc::new(FilesystemBackend::new(provider.name.clone(), root))
            }
            ProviderKind::Memory => {
                warn!(provider = %provider.name, "memory provider does not persist files");
                Arc::new(InMemoryBackend::new(provider.name.clone()))
            }
        };
        registry.register(backend);
    }
    Ok(registry)
}

fn build_runner(config: &RuntimeConfig, storage: Arc<FsTransferStorage>) -> Result<TransferRunner> {
    let settings = &config.settings;
    let mut executor = TransferExecutor::new(
        storage.clone(),
        storage.clone(),
        build_registry(&config.providers)?,
        RetryPolicy::from(&settings.retry),
    )
    .with_claim_ttl(Duration::from_secs(settings.executor.claim_ttl_secs))
    .with_listener(Arc::new(LoggingListener));
    if settings.notifications.enabled {
        executor = executor.with_alerts(
            Arc::new(TracingAlertSender),
            settings.notifications.clone(),
        );
    }

    Ok(
        TransferRunner::new(DueJobSelector::new(storage), Arc::new(executor))
            .with_concurrency(settings.executor.concurrency),
    )
}

async fn run(
    config: &RuntimeConfig,
    storage: Arc<FsTransferStorage>,
    watch: Option<u64>,
) -> Result<()> {
    let runner = build_runner(config, storage)?;
    let batch_limit = config.settings.executor.batch_limit;

    let Some(every) = watch else {
        let summary = runner.run_due(batch_limit).await?;
        return print_json(&summary);
    };
    if every == 0 {
        bail!("--watch interval must be at least one second");
    }

    info!(interval_secs = every, batch_limit, "fstransferd scheduler started");
    let mut ticker = tokio::time::interval(Duration::from_secs(every));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = runner.run_due(batch_limit).await {
                    warn!(error = %err, "transfer run failed");
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                info!("fstransferd scheduler stopping");
                return Ok(());
            }
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}

fn parse_status(value: &str) -> Result<RequestStatus, String> {
    let status = RequestStatus::from_stored(&value.to_ascii_uppercase());
    if status == RequestStatus::Unknown && !value.eq_ignore_ascii_case("unknown") {
        return Err(format!(
            "unknown status {value}; expected one of TODO, FAILED, DONE, ERROR, UNKNOWN"
        ));
    }
    Ok(status)
}
