//! vzip: containers with individually encrypted entries
//!
//! Commands:
//!   archive <source> [-o <out>]   - pack a file or directory tree
//!   extract <container> [-d <dir>] - unpack and decrypt every entry
//!   shell                         - interactive archive/extract loop
//!   config show                   - display the effective configuration

mod shell;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use vzip_archive::{ArchiveOptions, ExtractOptions, ExtractReport, ProgressFn};
use vzip_core::config::{expand_tilde, VzipConfig};
use vzip_crypto::{derive_key, KdfAlgorithm, KdfParams, Key};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "vzip",
    version,
    about = "Archive directory trees with per-file encryption",
    long_about = "vzip: pack files into a ZIP container whose entries are each sealed \
                  with AES-256-GCM under a passphrase-derived key. Names and \
                  permissions stay readable; contents do not."
)]
struct Cli {
    /// Path to config.toml
    #[arg(long, short = 'c', env = "VZIP_CONFIG", default_value = "~/.config/vzip/config.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides config
    #[arg(long, env = "VZIP_LOG")]
    log: Option<String>,

    /// Log format; overrides config
    #[arg(long, env = "VZIP_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Environment variable holding the passphrase; overrides config
    #[arg(long, global = true)]
    passphrase_env: Option<String>,

    /// Read the passphrase from this file instead of prompting
    #[arg(long, global = true)]
    passphrase_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pack a file or directory tree into an encrypted container
    Archive {
        /// File or directory to archive
        source: PathBuf,
        /// Container path (default: <source name>.zip)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Files encrypted concurrently (overrides config)
        #[arg(long)]
        batch: Option<usize>,
    },

    /// Decrypt and unpack a container
    ///
    /// Extraction is not atomic: if it stops part-way, files already written
    /// stay in the destination.
    Extract {
        /// Container to extract
        container: PathBuf,
        /// Destination directory (default: current directory)
        #[arg(long, short = 'd')]
        dest: Option<PathBuf>,
        /// Skip entries that fail to decrypt instead of stopping
        #[arg(long)]
        keep_going: bool,
        /// Delete the container after every entry extracted successfully
        #[arg(long)]
        remove_container: bool,
    },

    /// Interactive loop: choose archive or extract, enter a path, repeat
    Shell,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show {
        #[arg(long, default_value = "toml")]
        format: ShowFormat,
    },
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Clone, Debug, ValueEnum)]
enum ShowFormat {
    Toml,
    Json,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = VzipConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;

    if let Some(var) = &cli.passphrase_env {
        config.kdf.passphrase_env = var.clone();
    }
    if let Some(file) = &cli.passphrase_file {
        config.kdf.passphrase_file = Some(file.clone());
    }

    let format = cli.log_format.clone().unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(log_filter(cli.log.as_deref(), &config.log.level), &format);

    match cli.command {
        Commands::Archive { source, output, batch } => {
            if let Some(b) = batch {
                config.archive.encrypt_batch = b.max(1);
            }
            require_path(&source, "source")?;
            let key = load_key(&config, true)?;
            let output = output.unwrap_or_else(|| default_container_path(&config, &source));
            cmd_archive(&config, &key, &source, &output)
        }
        Commands::Extract { container, dest, keep_going, remove_container } => {
            config.extract.keep_going |= keep_going;
            config.extract.remove_container |= remove_container;
            require_path(&container, "container")?;
            let key = load_key(&config, false)?;
            let dest = dest.unwrap_or_else(|| PathBuf::from("."));
            cmd_extract(&config, &key, &container, &dest).map(|_| ())
        }
        Commands::Shell => shell::run(&config),
        Commands::Config { action: ConfigAction::Show { format } } => {
            cmd_config_show(&config, &cli.config, &format)
        }
    }
}

/// `--log`/`VZIP_LOG` first, then `RUST_LOG`, then the config file level.
fn log_filter(explicit: Option<&str>, configured: &str) -> EnvFilter {
    match explicit {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured)),
    }
}

fn init_logging(filter: EnvFilter, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

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

// ── Key handling ──────────────────────────────────────────────────────────────

fn kdf_params(config: &VzipConfig) -> Result<KdfParams> {
    let algorithm: KdfAlgorithm = config
        .kdf
        .algorithm
        .parse()
        .context("invalid kdf.algorithm")?;

    let mut params = KdfParams {
        algorithm,
        mem_cost_kib: config.kdf.argon2_mem_cost_kib,
        parallelism: config.kdf.argon2_parallelism,
        ..KdfParams::default()
    };
    params.iterations = match (config.kdf.iterations, algorithm) {
        (Some(n), _) => n,
        (None, KdfAlgorithm::Pbkdf2Sha256) => vzip_crypto::DEFAULT_ITERATIONS,
        (None, KdfAlgorithm::Argon2id) => 3,
    };
    if let Some(salt) = &config.kdf.salt {
        params.salt = salt.as_bytes().to_vec();
    }
    Ok(params)
}

/// Passphrase from env var, then passphrase file, then an interactive prompt.
fn read_passphrase(config: &VzipConfig, confirm: bool) -> Result<SecretString> {
    if let Ok(value) = std::env::var(&config.kdf.passphrase_env) {
        info!(var = %config.kdf.passphrase_env, "passphrase taken from environment");
        return Ok(SecretString::from(value));
    }

    if let Some(path) = &config.kdf.passphrase_file {
        let path = expand_tilde(path);
        let content = Zeroizing::new(
            std::fs::read_to_string(&path)
                .with_context(|| format!("reading passphrase file: {}", path.display()))?,
        );
        let line = content.lines().next().unwrap_or_default();
        return Ok(SecretString::from(line.to_string()));
    }

    let first = prompt_secret("Passphrase: ")?;
    if confirm {
        let second = prompt_secret("Confirm passphrase: ")?;
        ensure_same(&first, &second)?;
    }
    Ok(first)
}

fn prompt_secret(prompt: &str) -> Result<SecretString> {
    rpassword::prompt_password(prompt)
        .map(SecretString::from)
        .context("reading passphrase")
}

fn ensure_same(first: &SecretString, second: &SecretString) -> Result<()> {
    if first.expose_secret() != second.expose_secret() {
        anyhow::bail!("passphrases do not match");
    }
    Ok(())
}

fn load_key(config: &VzipConfig, confirm: bool) -> Result<Key> {
    let params = kdf_params(config)?;
    if params.uses_default_salt() {
        warn!("using the built-in salt shared by every vzip container; set kdf.salt to isolate yours");
    }
    let passphrase = read_passphrase(config, confirm)?;

    let spinner = make_spinner("kdf");
    spinner.set_message(format!("deriving key ({})", params.algorithm));
    let key = derive_key(&passphrase, &params).context("deriving key")?;
    spinner.finish_and_clear();
    Ok(key)
}

// ── Paths ─────────────────────────────────────────────────────────────────────

/// Fail before any prompting or key derivation if `path` is missing.
fn require_path(path: &Path, what: &str) -> Result<()> {
    std::fs::metadata(path)
        .map(|_| ())
        .with_context(|| format!("{what} not found: {}", path.display()))
}

/// Base name used for the container root; resolved only for `.`, `..` and `/`.
fn source_name(source: &Path) -> Option<String> {
    match source.file_name() {
        Some(name) => Some(name.to_string_lossy().to_string()),
        None => std::fs::canonicalize(source)
            .ok()?
            .file_name()
            .map(|n| n.to_string_lossy().to_string()),
    }
}

/// `<output_dir or cwd>/<source base name>.zip`
fn default_container_path(config: &VzipConfig, source: &Path) -> PathBuf {
    let base = source_name(source).unwrap_or_else(|| "archive".to_string());
    let dir = config
        .archive
        .output_dir
        .as_deref()
        .map(expand_tilde)
        .unwrap_or_default();
    dir.join(format!("{base}.zip"))
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map(|s| s.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn make_progress_bar(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(bar_style());
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

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

fn progress_callback(pb: &ProgressBar) -> ProgressFn {
    let pb = pb.clone();
    Box::new(move |done, total, msg| {
        pb.set_length(total);
        pb.set_position(done);
        pb.set_message(msg.to_string());
    })
}

// ── `vzip archive` ────────────────────────────────────────────────────────────

fn cmd_archive(config: &VzipConfig, key: &Key, source: &Path, output: &Path) -> Result<()> {
    println!("Archiving {} → {}", source.display(), output.display());

    let pb = make_progress_bar("archive");
    let progress = progress_callback(&pb);
    let options = ArchiveOptions {
        encrypt_batch: config.archive.encrypt_batch,
    };

    let result = vzip_archive::archive_to_path(source, output, key, &options, Some(&progress));
    pb.finish_and_clear();
    let report = result.with_context(|| format!("archiving {}", source.display()))?;

    println!("Archive complete:");
    println!("  files:       {}", report.files);
    println!("  directories: {}", report.directories);
    if report.skipped > 0 {
        println!("  skipped:     {} (special files)", report.skipped);
    }
    println!("  plaintext:   {}", fmt_bytes(report.plaintext_bytes));
    println!("  stored:      {}", fmt_bytes(report.stored_bytes));
    Ok(())
}

// ── `vzip extract` ────────────────────────────────────────────────────────────

fn cmd_extract(
    config: &VzipConfig,
    key: &Key,
    container: &Path,
    dest: &Path,
) -> Result<ExtractReport> {
    require_path(container, "container")?;
    println!("Extracting {} → {}", container.display(), dest.display());

    let pb = make_progress_bar("extract");
    let progress = progress_callback(&pb);
    let options = ExtractOptions {
        keep_going: config.extract.keep_going,
    };

    let result = vzip_archive::extract_from_path(container, dest, key, &options, Some(&progress));
    pb.finish_and_clear();
    let report = result.with_context(|| {
        format!(
            "extracting {} (files already written to {} were kept)",
            container.display(),
            dest.display()
        )
    })?;

    println!("Extract complete:");
    println!("  files:       {}", report.files);
    println!("  directories: {}", report.directories);
    println!("  bytes:       {}", fmt_bytes(report.bytes));

    if !report.is_complete() {
        for failure in &report.failures {
            eprintln!("  failed: {} ({})", failure.entry, failure.error);
        }
        anyhow::bail!(
            "{} entries could not be decrypted; container kept",
            report.failures.len()
        );
    }

    if config.extract.remove_container {
        match std::fs::remove_file(container) {
            Ok(()) => println!("  removed:     {}", container.display()),
            Err(e) => warn!(container = %container.display(), "could not remove container: {e}"),
        }
    }
    Ok(report)
}

// ── `vzip config show` ────────────────────────────────────────────────────────

fn cmd_config_show(config: &VzipConfig, path: &Path, format: &ShowFormat) -> Result<()> {
    println!("# config: {}", expand_tilde(path).display());
    let rendered = match format {
        ShowFormat::Toml => toml::to_string_pretty(config).context("serializing config")?,
        ShowFormat::Json => serde_json::to_string_pretty(config).context("serializing config")?,
    };
    println!("{rendered}");
    Ok(())
}

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
