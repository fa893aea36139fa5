use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration (loaded from chainfs.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainfsConfig {
    pub storage: StorageConfig,
    pub assembler: AssemblerConfig,
    pub extract: ExtractConfig,
    pub log: LogConfig,
}

impl ChainfsConfig {
    /// Load from a TOML file, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
        toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))
    }
}

/// Which OpenDAL service backs the chunk store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Local directory (`root`)
    Fs,
    /// S3-compatible endpoint
    S3,
    /// In-process map; empty on every start, useful for tests
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Store backend (default: fs)
    pub backend: StorageBackend,
    /// Root directory for the fs backend
    pub root: PathBuf,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// S3 bucket name
    pub bucket: String,
    /// Object prefix; chunks live at `{prefix}/chunks/{address}`
    pub prefix: String,
    /// Enforce HTTPS for S3 connections (error on HTTP endpoints)
    pub enforce_tls: bool,
    /// Retry attempts for transient store errors
    pub max_retries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Upper bound on chain length; longer chains are rejected
    pub max_chain_length: u64,
    /// Verify every fetched chunk hashes to its address
    pub verify_addresses: bool,
}

/// Format of the reconstructed stream handed to extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveFormat {
    /// gzip-compressed tar
    TarGz,
    /// zstd-compressed tar
    TarZst,
    /// Write the stream as a single file
    Raw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Archive format (default: tar-gz)
    pub format: ArchiveFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Fs,
            root: PathBuf::from("~/.local/share/chainfs/store"),
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "chainfs".into(),
            prefix: "chainfs".into(),
            enforce_tls: false,
            max_retries: 5,
        }
    }
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            max_chain_length: 1 << 20,
            verify_addresses: true,
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            format: ArchiveFormat::TarGz,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}
