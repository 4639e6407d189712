use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use drive_core::DriveClient;
use drive_upload::config::UploadConfig;
use drive_upload::storage::{KvStore, SessionStore};
use drive_upload::upload::{
    MemoryTree, RunOutcome, UploadEvent, UploadMode, UploadSession, Uploader, selection_from_path,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliMode {
    Upload {
        path: PathBuf,
        folder: Option<String>,
    },
    Resume {
        path: PathBuf,
    },
    Status,
    Dismiss,
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut path = None;
    let mut folder = None;
    let mut resume = false;
    let mut status = false;
    let mut dismiss = false;

    let mut args = args.into_iter().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(CliMode::Help),
            "--status" => status = true,
            "--dismiss" => dismiss = true,
            "--resume" => resume = true,
            "--folder" => {
                let id = args.next().context("--folder needs a folder id")?;
                folder = Some(id);
            }
            other if other.starts_with('-') => anyhow::bail!("unknown argument: {other}"),
            other => {
                if path.replace(PathBuf::from(other)).is_some() {
                    anyhow::bail!("only one path may be uploaded at a time");
                }
            }
        }
    }

    match (status, dismiss, resume) {
        (true, false, false) if path.is_none() && folder.is_none() => Ok(CliMode::Status),
        (false, true, false) if path.is_none() && folder.is_none() => Ok(CliMode::Dismiss),
        (false, false, true) => {
            if folder.is_some() {
                anyhow::bail!("--resume uploads into the stored folder; drop --folder");
            }
            let path = path.context("--resume needs the original local path")?;
            Ok(CliMode::Resume { path })
        }
        (false, false, false) => {
            let path = path.context("missing path to upload")?;
            Ok(CliMode::Upload { path, folder })
        }
        _ => anyhow::bail!("--status, --dismiss and --resume cannot be combined with other modes"),
    }
}

fn print_usage() {
    println!("Usage: drive-upload <PATH> [--folder <ID>]");
    println!("       drive-upload --resume <PATH>");
    println!("       drive-upload --status | --dismiss");
    println!("  --folder <ID>   Destination folder (default: your root folder)");
    println!("  --resume        Continue the interrupted upload of PATH");
    println!("  --status        Show the interrupted upload, if any");
    println!("  --dismiss       Forget the interrupted upload");
}

fn describe_session(session: &UploadSession) -> String {
    format!(
        "\"{}\": {}/{} files ({}%) into folder {}",
        session.batch_label,
        session.completed_count(),
        session.total_count,
        session.percent_complete(),
        session.target_folder_id
    )
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("drive_upload=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let mode = parse_cli_mode(std::env::args())?;
    if mode == CliMode::Help {
        print_usage();
        return Ok(());
    }

    let config = UploadConfig::from_env()?;
    let store = SessionStore::new(KvStore::open_or_memory(&config.state_db_path()).await);

    match &mode {
        CliMode::Status => {
            match store.load().await.context("failed to read upload session")? {
                Some(session) => println!("Interrupted upload {}", describe_session(&session)),
                None => println!("No interrupted upload"),
            }
            return Ok(());
        }
        CliMode::Dismiss => {
            store.clear().await.context("failed to clear upload session")?;
            println!("Interrupted upload dismissed");
            return Ok(());
        }
        _ => {}
    }

    if !store.is_durable() {
        tracing::warn!("upload progress is kept in memory only and cannot be resumed after exit");
    }

    let token = config.token.clone().context("DRIVE_TOKEN is not set")?;
    let client = DriveClient::with_base_url(&config.api_url, token)
        .with_context(|| format!("invalid DRIVE_API_URL: {}", config.api_url))?;

    let (selection_path, upload_mode) = match mode {
        CliMode::Resume { path } => (path, UploadMode::Resume),
        CliMode::Upload {
            path,
            folder: Some(folder),
        } => {
            client
                .get_folder(&folder)
                .await
                .with_context(|| format!("folder {folder} is not accessible"))?;
            let mode = UploadMode::Fresh {
                current_folder_id: folder,
            };
            (path, mode)
        }
        CliMode::Upload { path, folder: None } => {
            let me = client.get_me().await.context("failed to resolve root folder")?;
            tracing::info!(user = %me.username, root = %me.root_id, "uploading into root folder");
            let mode = UploadMode::Fresh {
                current_folder_id: me.root_id,
            };
            (path, mode)
        }
        CliMode::Status | CliMode::Dismiss | CliMode::Help => return Ok(()),
    };

    let selection = selection_from_path(&selection_path)
        .with_context(|| format!("failed to read {}", selection_path.display()))?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let tree = Arc::new(MemoryTree::new());
    let uploader = Uploader::new(client, store, tree.clone())
        .with_concurrency(config.concurrency)
        .with_events(tx);

    let controller = uploader.controller();
    let on_interrupt = controller.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel().await;
        }
    });

    let printer = tokio::spawn(async move {
        let mut speed = String::new();
        while let Some(event) = rx.recv().await {
            match event {
                UploadEvent::Preparing { pending, total } => {
                    println!("Uploading {pending} of {total} files");
                }
                UploadEvent::ItemCompleted {
                    path,
                    completed,
                    total,
                } => println!("[{completed}/{total}] {path} {speed}"),
                UploadEvent::ItemFailed {
                    path,
                    error,
                    retryable,
                } => {
                    let hint = if retryable { " (resume to retry)" } else { "" };
                    eprintln!("failed: {path}: {error}{hint}");
                }
                UploadEvent::Speed { label, .. } => speed = label,
                UploadEvent::Finished(_) => break,
            }
        }
    });

    let result = uploader.run(selection, upload_mode, &controller).await;
    drop(uploader);
    if let Err(err) = printer.await {
        tracing::debug!("progress printer ended abnormally: {err}");
    }
    let report = result?;

    match report.outcome {
        RunOutcome::Completed => {
            println!("Uploaded {} files ({} items now known)", report.uploaded, tree.len());
            Ok(())
        }
        RunOutcome::Cancelled => {
            println!("Upload cancelled after {} files", report.uploaded);
            Ok(())
        }
        RunOutcome::CompletedWithFailures => anyhow::bail!(
            "{} files failed; run `drive-upload --resume {}` to retry",
            report.failed,
            selection_path.display()
        ),
    }
}
