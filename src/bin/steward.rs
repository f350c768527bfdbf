//! Operates a Steward vault from the command line.
//!
//! Usage:
//!
//! ```text
//! steward run [vault]
//! steward pass [vault]
//! steward submit <kind> <priority> <body> [action-name]
//! steward approve <id> [vault]
//! steward reject <id> [vault]
//! steward snapshot [vault]
//! ```
//!
//! `run` reconciles on a fixed interval until interrupted. `pass` runs one
//! reconciliation pass and prints the resulting snapshot. The vault defaults
//! to `STEWARD_VAULT`, then `./vault`.

use camino::Utf8PathBuf;
use mockable::DefaultClock;
use std::io::{self, Write};
use std::sync::Arc;
use steward::config::{ConfigError, EngineConfig};
use steward::task::{
    adapters::{
        HandbookClassifier, JournalExecutor,
        filesystem::{FileActionLog, FileSnapshotSink, FileTaskStore, VaultLayout},
    },
    domain::{ActionDescriptor, Priority, TaskDomainError, TaskId},
    ports::{ActionLog, SnapshotSinkError},
    services::{
        ApprovalError, ApprovalService, Collaborators, ReconcileError, Reconciler, Scheduler,
        SubmissionError, SubmissionService, SubmitRequest,
    },
};
use steward::telemetry;
use thiserror::Error;
use tokio::runtime::Builder;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
enum CliError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to open vault {path}: {source}")]
    Vault {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("runtime init failed: {0}")]
    RuntimeInit(#[source] io::Error),
    #[error(transparent)]
    Domain(#[from] TaskDomainError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotSinkError),
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Run {
        vault: Option<Utf8PathBuf>,
    },
    Pass {
        vault: Option<Utf8PathBuf>,
    },
    Submit {
        kind: String,
        priority: Priority,
        body: String,
        action: Option<String>,
    },
    Approve {
        id: String,
        vault: Option<Utf8PathBuf>,
    },
    Reject {
        id: String,
        vault: Option<Utf8PathBuf>,
    },
    Snapshot {
        vault: Option<Utf8PathBuf>,
    },
}

impl Command {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, CliError> {
        let operation = args.next().ok_or_else(|| usage("missing command"))?;
        let command = match operation.as_str() {
            "run" => Self::Run {
                vault: args.next().map(Utf8PathBuf::from),
            },
            "pass" => Self::Pass {
                vault: args.next().map(Utf8PathBuf::from),
            },
            "submit" => {
                let kind = args.next().ok_or_else(|| usage("submit requires <kind>"))?;
                let priority = args
                    .next()
                    .ok_or_else(|| usage("submit requires <priority>"))?;
                let body = args.next().ok_or_else(|| usage("submit requires <body>"))?;
                Self::Submit {
                    kind,
                    priority: Priority::parse_lenient(Some(&priority)),
                    body,
                    action: args.next(),
                }
            }
            "approve" => Self::Approve {
                id: args.next().ok_or_else(|| usage("approve requires <id>"))?,
                vault: args.next().map(Utf8PathBuf::from),
            },
            "reject" => Self::Reject {
                id: args.next().ok_or_else(|| usage("reject requires <id>"))?,
                vault: args.next().map(Utf8PathBuf::from),
            },
            "snapshot" => Self::Snapshot {
                vault: args.next().map(Utf8PathBuf::from),
            },
            other => {
                return Err(usage(&format!(
                    "unknown command '{other}'; expected run, pass, submit, approve, reject, or snapshot"
                )));
            }
        };
        if let Some(extra) = args.next() {
            return Err(usage(&format!("unexpected argument '{extra}'")));
        }
        Ok(command)
    }

    fn vault_override(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::Run { vault }
            | Self::Pass { vault }
            | Self::Approve { vault, .. }
            | Self::Reject { vault, .. }
            | Self::Snapshot { vault } => vault.as_ref(),
            Self::Submit { .. } => None,
        }
    }
}

fn usage(message: &str) -> CliError {
    CliError::InvalidArgs(message.to_owned())
}

/// Vault adapters shared by every command.
struct Vault {
    store: Arc<FileTaskStore>,
    action_log: Arc<FileActionLog>,
    snapshot_sink: Arc<FileSnapshotSink>,
    clock: Arc<DefaultClock>,
}

impl Vault {
    fn open(config: &EngineConfig) -> Result<Self, CliError> {
        let layout = VaultLayout::open(&config.vault).map_err(|source| CliError::Vault {
            path: config.vault.clone(),
            source,
        })?;
        Ok(Self {
            store: Arc::new(FileTaskStore::new(layout.clone())),
            action_log: Arc::new(FileActionLog::new(layout.clone())),
            snapshot_sink: Arc::new(FileSnapshotSink::new(layout)),
            clock: Arc::new(DefaultClock),
        })
    }

    fn action_log(&self) -> Arc<dyn ActionLog> {
        self.action_log.clone()
    }

    fn reconciler(&self, config: &EngineConfig) -> Reconciler<FileTaskStore, DefaultClock> {
        let collaborators = Collaborators {
            decision: Arc::new(HandbookClassifier::new()),
            executor: Arc::new(JournalExecutor),
            action_log: self.action_log(),
            snapshot_sink: self.snapshot_sink.clone(),
        };
        Reconciler::new(
            Arc::clone(&self.store),
            collaborators,
            config.reconcile_policy(),
            Arc::clone(&self.clock),
        )
    }
}

fn main() -> Result<(), BoxError> {
    telemetry::init_tracing()?;
    let command = Command::parse(std::env::args().skip(1))?;
    let mut config = EngineConfig::from_env()?;
    if let Some(vault) = command.vault_override() {
        config.vault = vault.clone();
    }
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::RuntimeInit)?;
    runtime.block_on(execute(command, &config))?;
    Ok(())
}

async fn execute(command: Command, config: &EngineConfig) -> Result<(), CliError> {
    let vault = Vault::open(config)?;
    match command {
        Command::Run { .. } => run(&vault, config).await,
        Command::Pass { .. } => {
            let reconciler = vault.reconciler(config);
            let report = reconciler.run_pass(&CancellationToken::new()).await?;
            info!(pass = report.pass, moved = report.moved, "pass finished");
            print_json(&reconciler.snapshot())
        }
        Command::Submit {
            kind,
            priority,
            body,
            action,
        } => {
            let service = SubmissionService::new(
                Arc::clone(&vault.store),
                vault.action_log(),
                Arc::clone(&vault.clock),
            );
            let mut request = SubmitRequest::new(kind, body).with_priority(priority);
            if let Some(name) = action {
                request = request.with_action(ActionDescriptor::new(name)?);
            }
            let id = service.submit(request).await?;
            print_line(id.as_str())
        }
        Command::Approve { id, .. } => {
            let record = approval(&vault).approve(&TaskId::parse(id)?).await?;
            print_line(&format!("{} -> {}", record.id(), record.state()))
        }
        Command::Reject { id, .. } => {
            let record = approval(&vault).reject(&TaskId::parse(id)?).await?;
            print_line(&format!("{} -> {}", record.id(), record.state()))
        }
        Command::Snapshot { .. } => print_json(&vault.snapshot_sink.load().await?),
    }
}

fn approval(vault: &Vault) -> ApprovalService<FileTaskStore, DefaultClock> {
    ApprovalService::new(
        Arc::clone(&vault.store),
        vault.action_log(),
        Arc::clone(&vault.clock),
    )
}

async fn run(vault: &Vault, config: &EngineConfig) -> Result<(), CliError> {
    let scheduler = Scheduler::new(Arc::new(vault.reconciler(config)), config.pass_interval);
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for interrupt");
        }
        interrupt.cancel();
    });
    info!(vault = %config.vault, "steward running; press Ctrl-C to stop");
    scheduler.run(&cancel).await;
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::Output(io::Error::other(err)))?;
    print_line(&text)
}

fn print_line(text: &str) -> Result<(), CliError> {
    writeln!(io::stdout().lock(), "{text}").map_err(CliError::Output)
}
