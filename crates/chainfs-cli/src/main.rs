//! chainfs: rebuild files from encrypted chunk chains
//!
//! Commands:
//!   reconstruct <tail> <dest>  - walk the chain from its tail and extract it
//!   inspect <tail>             - walk the chain and list its chunks
//!   status                     - check that the chunk store is reachable
//!   config show                - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use chainfs_assembler::{extractor_for, walk_with, Reconstructor, WalkOptions};
use chainfs_core::config::{ArchiveFormat, ChainfsConfig, StorageBackend};
use chainfs_core::Address;
use chainfs_crypto::{ChunkKey, XChaChaCipher};
use chainfs_storage::{OpendalStore, S3Credentials};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "chainfs",
    version,
    about = "Rebuild files from encrypted chunk chains",
    long_about = "chainfs: walk a chain of encrypted, content-addressed chunks from its tail \
                  and restore the original archive"
)]
struct Cli {
    /// Path to chainfs.toml configuration file
    #[arg(long, short = 'c', env = "CHAINFS_CONFIG", default_value = "/etc/chainfs/config.toml")]
    config: PathBuf,

    /// Log level filter (overrides config log.level)
    #[arg(long, env = "CHAINFS_LOG")]
    log: Option<String>,

    /// Log format (overrides config log.format)
    #[arg(long)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rebuild the file behind a tail address and extract it
    ///
    /// The tail key is read from --key-file, the CHAINFS_KEY environment
    /// variable, or an interactive prompt, in that order. S3 credentials come
    /// from AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY.
    Reconstruct {
        /// Tail chunk address (64 hex chars)
        tail: String,
        /// Destination directory (or file, with --format raw)
        destination: PathBuf,
        /// File holding the hex-encoded tail key
        #[arg(long, short = 'k')]
        key_file: Option<PathBuf>,
        /// Archive format of the reconstructed stream (overrides config)
        #[arg(long, short = 'f')]
        format: Option<FormatArg>,
    },

    /// Walk a chain and list its chunks without writing anything
    Inspect {
        /// Tail chunk address (64 hex chars)
        tail: String,
        /// File holding the hex-encoded tail key
        #[arg(long, short = 'k')]
        key_file: Option<PathBuf>,
    },

    /// Show chunk store configuration and reachability
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    TarGz,
    TarZst,
    Raw,
}

impl From<FormatArg> for ArchiveFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::TarGz => ArchiveFormat::TarGz,
            FormatArg::TarZst => ArchiveFormat::TarZst,
            FormatArg::Raw => ArchiveFormat::Raw,
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.clone().unwrap_or_else(|| {
        if config.log.format.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    });
    init_logging(&level, &format);

    match cli.command {
        Commands::Reconstruct {
            tail,
            destination,
            key_file,
            format,
        } => cmd_reconstruct(&config, &tail, &destination, key_file.as_deref(), format).await,
        Commands::Inspect { tail, key_file } => {
            cmd_inspect(&config, &tail, key_file.as_deref()).await
        }
        Commands::Status => cmd_status(&config).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so command output on stdout stays clean
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

fn load_config(path: &Path) -> Result<ChainfsConfig> {
    let path = expand_tilde(path);
    ChainfsConfig::load(&path).with_context(|| format!("loading config: {}", path.display()))
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}

// ── Chunk store from config + environment credentials ─────────────────────────

/// S3 credentials from AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY.
///
/// Only required for the S3 backend.
fn s3_credentials_from_env(config: &ChainfsConfig) -> Result<Option<S3Credentials>> {
    if config.storage.backend != StorageBackend::S3 {
        return Ok(None);
    }
    let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
        .or_else(|_| std::env::var("CHAINFS_ACCESS_KEY_ID"))
        .context(
            "S3 credentials not set\n\
             Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables.\n\
             Example:\n\
             \texport AWS_ACCESS_KEY_ID=your-key\n\
             \texport AWS_SECRET_ACCESS_KEY=your-secret",
        )?;
    let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
        .or_else(|_| std::env::var("CHAINFS_SECRET_ACCESS_KEY"))
        .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
    Ok(Some(S3Credentials {
        access_key_id,
        secret_access_key,
    }))
}

fn open_store(config: &ChainfsConfig) -> Result<OpendalStore> {
    let mut storage = config.storage.clone();
    storage.root = expand_tilde(&storage.root);

    let creds = s3_credentials_from_env(config)?;
    let op = chainfs_storage::build_from_core_config(&storage, creds.as_ref())
        .context("building storage operator")?;
    Ok(OpendalStore::new(op, &storage.prefix))
}

// ── Key input ─────────────────────────────────────────────────────────────────

/// Tail key from a file, CHAINFS_KEY, or an interactive prompt.
fn read_tail_key(key_file: Option<&Path>) -> Result<ChunkKey> {
    let hex_key: Zeroizing<String> = if let Some(path) = key_file {
        Zeroizing::new(
            std::fs::read_to_string(path)
                .with_context(|| format!("reading key file: {}", path.display()))?,
        )
    } else if let Ok(env_key) = std::env::var("CHAINFS_KEY") {
        Zeroizing::new(env_key)
    } else {
        Zeroizing::new(rpassword::prompt_password("Tail key (hex): ").context("reading key")?)
    };

    ChunkKey::from_hex(hex_key.trim()).context("parsing tail key")
}

fn parse_tail(tail: &str) -> Result<Address> {
    Address::from_hex(tail.trim()).with_context(|| format!("invalid tail address: {tail}"))
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, stopping after the current chunk");
            token.cancel();
        }
    });
}

// ── Progress helpers ──────────────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

// ── `chainfs reconstruct` ─────────────────────────────────────────────────────

async fn cmd_reconstruct(
    config: &ChainfsConfig,
    tail: &str,
    destination: &Path,
    key_file: Option<&Path>,
    format: Option<FormatArg>,
) -> Result<()> {
    let tail = parse_tail(tail)?;
    let key = read_tail_key(key_file)?;
    let store = open_store(config)?;

    let format = format.map(ArchiveFormat::from).unwrap_or(config.extract.format);
    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    println!("Reconstructing {} → {}", tail.short(), destination.display());

    let pb = make_spinner("reconstruct");
    pb.set_message("fetching tail...".to_string());
    let pb_clone = pb.clone();

    let report = Reconstructor::from_config(&store, config)
        .with_extractor(extractor_for(format))
        .with_cancellation(cancel)
        .with_progress(Box::new(move |done, bytes, msg| {
            pb_clone.set_message(format!("{done} chunks, {} ({msg})", fmt_bytes(bytes)));
        }))
        .reconstruct(tail, key, destination)
        .await;

    let report = match report {
        Ok(report) => report,
        Err(e) => {
            pb.abandon_with_message("failed".to_string());
            return Err(e).with_context(|| format!("reconstructing {}", tail.short()));
        }
    };
    pb.finish_with_message("done".to_string());

    println!();
    println!("Reconstructed:");
    println!("  destination: {}", report.destination.display());
    println!("  chunks:      {}", report.chunks);
    println!("  chunk size:  {}", fmt_bytes(report.nominal_size as u64));
    println!("  bytes:       {}", fmt_bytes(report.bytes));

    Ok(())
}

// ── `chainfs inspect` ─────────────────────────────────────────────────────────

async fn cmd_inspect(config: &ChainfsConfig, tail: &str, key_file: Option<&Path>) -> Result<()> {
    let tail = parse_tail(tail)?;
    let key = read_tail_key(key_file)?;
    let store = open_store(config)?;

    let opts = WalkOptions::from(&config.assembler);
    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    println!("{:>6}  {:<64}  {:>10}  {:>8}  last", "step", "address", "payload", "padding");
    let traversal = walk_with(&store, &XChaChaCipher, tail, key, &opts, &cancel, |info, _| {
        println!(
            "{:>6}  {:<64}  {:>10}  {:>8}  {}",
            info.step,
            info.address,
            info.payload_len,
            info.padding,
            if info.is_last { "yes" } else { "" }
        );
    })
    .await
    .with_context(|| format!("walking chain {}", tail.short()))?;

    println!();
    println!("  chunks:     {}", traversal.chunk_count());
    println!("  chunk size: {}", fmt_bytes(traversal.nominal_size() as u64));
    println!("  bytes:      {}", fmt_bytes(traversal.buffer().len() as u64));

    Ok(())
}

// ── `chainfs status` ──────────────────────────────────────────────────────────

async fn cmd_status(config: &ChainfsConfig) -> Result<()> {
    let storage = &config.storage;
    let store = open_store(config)?;

    println!("chainfs v{}", env!("CARGO_PKG_VERSION"));
    match storage.backend {
        StorageBackend::Fs => {
            println!("  backend:  fs ({})", expand_tilde(&storage.root).display())
        }
        StorageBackend::S3 => println!(
            "  backend:  s3 ({}, bucket {})",
            storage.endpoint, storage.bucket
        ),
        StorageBackend::Memory => println!("  backend:  memory"),
    }
    println!("  prefix:   {}", storage.prefix);
    println!(
        "  limits:   max {} chunks, verify addresses: {}",
        config.assembler.max_chain_length, config.assembler.verify_addresses
    );

    match chainfs_storage::check_health(&store).await {
        Ok(entries) => {
            println!("  storage:  ok ({entries} entries)");
            Ok(())
        }
        Err(e) => {
            println!("  storage:  UNREACHABLE");
            Err(e)
        }
    }
}

// ── `chainfs config show` ─────────────────────────────────────────────────────

fn cmd_config_show(config: &ChainfsConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

// ── Utilities ─────────────────────────────────────────────────────────────────

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
