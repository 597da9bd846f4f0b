//! fileup entry point.

mod config;
mod surface;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fileup_transfer::HttpTransport;
use fileup_upload::{DropEntry, EtagCache, FsEntry, UploadSession, Verdict};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::config::{CliConfig, Overrides};
use crate::surface::TerminalSurface;

#[derive(Debug, Parser)]
#[command(name = "fileup", version, about = "Upload files and folders to a file server")]
struct Cli {
    /// Files or directories to upload.
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Server base URL, e.g. http://nas.local:8080.
    #[arg(long)]
    server: Option<String>,

    /// Destination directory on the server.
    #[arg(long, default_value = "/")]
    dest: String,

    /// Files per batch.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Batches uploaded at once.
    #[arg(long)]
    max_batches: Option<usize>,

    /// Transfers at once inside a batch.
    #[arg(long)]
    max_transfers: Option<usize>,

    /// Config file (default: ~/.config/fileup/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Debug logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            server: self.server.clone(),
            batch_size: self.batch_size,
            max_batches: self.max_batches,
            max_transfers: self.max_transfers,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(verdict) => exit_code(verdict),
        Err(e) => {
            tracing::error!(error = %e, "upload aborted");
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<Verdict> {
    let settings = CliConfig::load(cli.config.as_deref())?.resolve(&cli.overrides())?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        server = %settings.transport.base_url,
        dest = %cli.dest,
        "starting fileup"
    );

    let transport = HttpTransport::new(settings.transport)?;
    let session = UploadSession::new(Arc::new(transport), settings.policy)?
        .with_cache(Arc::new(EtagCache::new()));

    let mut roots: Vec<Arc<dyn DropEntry>> = Vec::with_capacity(cli.paths.len());
    for path in &cli.paths {
        let entry = FsEntry::open(path, settings.policy.scan_page_size)
            .await
            .with_context(|| format!("cannot open {}", path.display()))?;
        roots.push(Arc::new(entry));
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling upload");
            interrupt.cancel();
        }
    });

    let mut surface = TerminalSurface::new();
    let result = session
        .run_entries(roots, &cli.dest, &mut surface, cancel)
        .await;

    for failure in &result.failures {
        eprintln!("failed: {} ({})", failure.relative_path, failure.error);
    }
    println!("{}", result.message);
    Ok(result.verdict)
}

fn exit_code(verdict: Verdict) -> ExitCode {
    match verdict {
        Verdict::Success | Verdict::Empty => ExitCode::SUCCESS,
        Verdict::PartialSuccess => ExitCode::from(1),
        Verdict::Failure => ExitCode::from(2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let cli = Cli::try_parse_from([
            "fileup",
            "--server",
            "http://nas:8080",
            "--dest",
            "/photos",
            "--batch-size",
            "10",
            "-v",
            "a.jpg",
            "albums",
        ])
        .unwrap();

        assert_eq!(cli.paths, vec![PathBuf::from("a.jpg"), PathBuf::from("albums")]);
        assert_eq!(cli.dest, "/photos");
        assert!(cli.verbose);
        let overrides = cli.overrides();
        assert_eq!(overrides.server.as_deref(), Some("http://nas:8080"));
        assert_eq!(overrides.batch_size, Some(10));
        assert_eq!(overrides.max_batches, None);
    }

    #[test]
    fn dest_defaults_to_root_and_paths_required() {
        let cli = Cli::try_parse_from(["fileup", "x"]).unwrap();
        assert_eq!(cli.dest, "/");
        assert!(Cli::try_parse_from(["fileup"]).is_err());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(exit_code(Verdict::Success), ExitCode::SUCCESS);
        assert_eq!(exit_code(Verdict::Empty), ExitCode::SUCCESS);
        assert_eq!(exit_code(Verdict::PartialSuccess), ExitCode::from(1));
        assert_eq!(exit_code(Verdict::Failure), ExitCode::from(2));
    }
}
