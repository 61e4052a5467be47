use clap::{Parser, Subcommand};
use derive_more::{Display, Error};
use exn::ResultExt;
use ferry_asyncutils::{CancellationToken, WorkerPool};
use ferry_digest::{Digest, DigestSummary, digest_tree};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "FERRY_LOG";

#[derive(Debug, Display, Error)]
enum CliError {
    #[display("could not load configuration")]
    Config,
    #[display("digest run failed")]
    Digest,
}

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, global = true, env = "FERRY_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Checksum and classify every file under a directory
    Digest {
        #[arg(value_name = "DIR")]
        root: PathBuf,
        /// Leave out files whose full path matches this regular expression
        #[arg(long, value_name = "REGEX")]
        skip: Option<String>,
        #[arg(short, long, value_name = "NUM")]
        workers: Option<usize>,
        /// Record non-image files as failures
        #[arg(long)]
        images_only: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Digest {
            root,
            skip,
            workers,
            images_only,
        } => digest(cli.config, root, skip, workers, images_only).await,
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = ?err, "aborted");
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        },
    }
}

async fn digest(
    config: Option<PathBuf>,
    root: PathBuf,
    skip: Option<String>,
    workers: Option<usize>,
    images_only: bool,
) -> Result<ExitCode, exn::Exn<CliError>> {
    let mut loaded = ferry_config::load(config.as_deref()).or_raise(|| CliError::Config)?;
    // Flags win over every configuration layer.
    if skip.is_some() {
        loaded.digest.skip = skip;
    }
    if workers.is_some() {
        loaded.digest.workers = workers;
    }
    loaded.digest.images_only |= images_only;
    let settings = loaded.into_settings().or_raise(|| CliError::Config)?.digest;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, finishing in-flight files");
                cancel.cancel();
            }
        }
    });

    let pool = WorkerPool::new(settings.workers).with_cancellation(cancel);
    let mut run = digest_tree(&root, settings.skip, settings.options, &pool);
    let mut summary = DigestSummary::default();
    while let Some(digest) = run.digests.recv().await {
        print(&digest);
        summary.record(&digest);
    }
    let (walk, report) = run.finish().await.or_raise(|| CliError::Digest)?;

    tracing::info!(
        files = summary.files,
        images = summary.images,
        failures = summary.failures,
        bytes = summary.bytes,
        gigapixels = summary.gigapixels,
        skipped = walk.skipped,
        cancelled = walk.cancelled || report.cancelled,
        "digest finished"
    );
    Ok(if summary.failures > 0 { ExitCode::from(2) } else { ExitCode::SUCCESS })
}

fn print(digest: &Digest) {
    match (&digest.checksum, &digest.error) {
        (Some(checksum), None) if digest.is_image => println!(
            "{checksum}  {:>12}  {}x{} ({:.3} GP)  {}",
            digest.size,
            digest.width,
            digest.height,
            digest.gigapixels,
            digest.path.display()
        ),
        (Some(checksum), None) => println!("{checksum}  {:>12}  {}  {}", digest.size, digest.content_type, digest.path.display()),
        (_, Some(err)) => println!("FAILED  {}  {}", digest.path.display(), &**err),
        (None, None) => println!("FAILED  {}", digest.path.display()),
    }
}
