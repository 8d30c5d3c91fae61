use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use binstore::{
    application::Application,
    domain::value_objects::{ContentHash, ExternalMode},
    infrastructure::storage::ExternalStoreConfig,
    ports::{ReferenceSet, TaskControl, TracingReporter},
    ApplicationBuilder, BinaryUpload, Config,
};

#[derive(Parser)]
#[command(name = "binstore", version, about = "Content-addressable binary store")]
struct Cli {
    /// TOML configuration file; BINSTORE_* variables override it
    #[arg(long, short, env = "BINSTORE_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a file and print its info
    Put { file: PathBuf },
    /// Write a binary to stdout or a file
    Get {
        hash: ContentHash,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Show the catalog record of a binary
    Stat { hash: ContentHash },
    /// Run one garbage collection
    Gc {
        #[command(flatten)]
        references: References,
    },
    /// Run garbage collection periodically until interrupted
    RunGc {
        #[command(flatten)]
        references: References,
    },
    /// Remove stored binaries that have no catalog record
    Prune,
    /// Check catalog and provider health
    Health,
    /// Put an external filestore behind the internal store
    AttachExternal {
        dir: PathBuf,
        #[arg(long, default_value = "passthrough")]
        mode: ExternalMode,
    },
    /// Copy external content inward and remove the external store
    DetachExternal,
    /// Catalog count and total size
    Stats,
}

#[derive(clap::Args)]
#[group(required = true, multiple = false)]
struct References {
    /// Treat every cataloged binary as unreferenced
    #[arg(long)]
    all_unreferenced: bool,

    /// File with one referenced hash per line
    #[arg(long)]
    referenced: Option<PathBuf>,
}

impl References {
    fn load(&self) -> anyhow::Result<ReferenceSet> {
        if self.all_unreferenced {
            return Ok(ReferenceSet::new());
        }
        match &self.referenced {
            Some(path) => load_reference_file(path),
            None => bail!("either --all-unreferenced or --referenced is required"),
        }
    }
}

fn load_reference_file(path: &Path) -> anyhow::Result<ReferenceSet> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read reference list {}", path.display()))?;
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            line.parse::<ContentHash>()
                .with_context(|| format!("Invalid hash in {}: {}", path.display(), line))
        })
        .collect()
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn build(config: Config) -> anyhow::Result<Application> {
    let app = ApplicationBuilder::new(config)
        .with_database()
        .await
        .map_err(|e| anyhow::anyhow!(e))?
        .with_storage()
        .await
        .map_err(|e| anyhow::anyhow!(e))?
        .build()
        .map_err(|e| anyhow::anyhow!(e))?;
    Ok(app)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = match &cli.config {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::from_env(),
    };
    config.validate().map_err(anyhow::Error::msg)?;
    info!("Configuration loaded and validated");

    let app = build(config).await?;
    let store = Arc::clone(&app.store);

    match cli.command {
        Command::Put { file } => {
            let handle = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("Failed to open {}", file.display()))?;
            let info = store.add_stream(BinaryUpload::new(Box::pin(handle))).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::Get { hash, output } => {
            let mut reader = store.get_stream(&hash).await?;
            let bytes = match output {
                Some(path) => {
                    let mut file = tokio::fs::File::create(&path).await?;
                    let bytes = tokio::io::copy(&mut reader, &mut file).await?;
                    file.flush().await?;
                    bytes
                }
                None => {
                    let mut stdout = tokio::io::stdout();
                    let bytes = tokio::io::copy(&mut reader, &mut stdout).await?;
                    stdout.flush().await?;
                    bytes
                }
            };
            info!(hash = %hash, bytes, "Binary written");
        }
        Command::Stat { hash } => match store.find(&hash).await? {
            Some(info) => println!("{}", serde_json::to_string_pretty(&info)?),
            None => bail!("Binary not found: {}", hash),
        },
        Command::Gc { references } => {
            let resolver = Arc::new(references.load()?);
            let control = TaskControl::new();
            let interrupt = control.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, stopping after the current batch");
                    interrupt.cancel();
                }
            });

            let result = store
                .garbage_collect(resolver, &control, &TracingReporter)
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::RunGc { references } => {
            let gc = app.garbage_collector(Arc::new(references.load()?));
            let token = gc.cancellation_token();
            let worker = tokio::spawn(Arc::clone(&gc).run());

            tokio::signal::ctrl_c().await?;
            info!("Shutting down garbage collector");
            token.cancel();
            worker.await?;
            println!("{}", gc.statistics().summary());
        }
        Command::Prune => {
            let report = store.prune(&TracingReporter).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_success() {
                bail!("Prune finished with {} errors", report.errors.len());
            }
        }
        Command::Health => {
            let report = store.health_check().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.healthy {
                bail!("Unhealthy: {}", report.issues.join("; "));
            }
        }
        Command::AttachExternal { dir, mode } => {
            let report = store
                .attach_external_store(ExternalStoreConfig::new(dir, mode), &TracingReporter)
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::DetachExternal => {
            let report = store.detach_external_store(&TracingReporter).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.chain_updated {
                bail!("External store kept attached: {} errors", report.errors.len());
            }
        }
        Command::Stats => {
            let stats = store.count_and_size().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
