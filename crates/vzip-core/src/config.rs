use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{VzipError, VzipResult};

/// Top-level configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VzipConfig {
    pub kdf: KdfConfig,
    pub archive: ArchiveConfig,
    pub extract: ExtractConfig,
    pub log: LogConfig,
}

/// Key derivation settings. Changing any of these changes the key, so
/// containers written under old settings need the old settings to open.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    /// "pbkdf2-sha256" (default) or "argon2id"
    pub algorithm: String,
    /// PBKDF2 rounds or Argon2id time cost (default: library default)
    pub iterations: Option<u32>,
    /// Salt string (default: built-in salt shared by all containers)
    pub salt: Option<String>,
    /// Argon2id memory cost in KiB
    pub argon2_mem_cost_kib: u32,
    /// Argon2id parallelism
    pub argon2_parallelism: u32,
    /// Environment variable read for the passphrase before prompting
    pub passphrase_env: String,
    /// File whose first line is the passphrase
    pub passphrase_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Files read and encrypted concurrently (1 = sequential)
    pub encrypt_batch: usize,
    /// Directory for containers when no output path is given (default: cwd)
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Continue past entries that fail to decrypt
    pub keep_going: bool,
    /// Delete the container after a fully successful extraction
    pub remove_container: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: warn)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            algorithm: "pbkdf2-sha256".into(),
            iterations: None,
            salt: None,
            argon2_mem_cost_kib: 65536,
            argon2_parallelism: 4,
            passphrase_env: "VZIP_PASSPHRASE".into(),
            passphrase_file: None,
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            encrypt_batch: 1,
            output_dir: None,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}

impl VzipConfig {
    /// Load from `path`, falling back to defaults if the file does not exist.
    pub fn load(path: &Path) -> VzipResult<Self> {
        let path = expand_tilde(path);
        if !path.exists() {
            tracing::debug!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| VzipError::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> VzipResult<()> {
        if self.archive.encrypt_batch == 0 {
            return Err(VzipError::Config(
                "archive.encrypt_batch must be at least 1".into(),
            ));
        }
        if self.kdf.iterations == Some(0) {
            return Err(VzipError::Config("kdf.iterations must be at least 1".into()));
        }
        Ok(())
    }
}

/// Expand `~` in path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}
