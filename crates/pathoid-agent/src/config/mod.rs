//! Configuration loading for PathoID.
//! Reads pathoid.toml from the current directory or the path in the PATHOID_CONFIG env var.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use pathoid_ingestion::loader::ColumnMap;
use pathoid_ingestion::pipeline::SearchConfig;
use pathoid_ingestion::query::{QueryPolicy, DEFAULT_RETMAX};
use pathoid_ingestion::report::OutputMode;
use pathoid_ingestion::sources::clinvar::EUTILS_BASE_URL;

pub const CONFIG_ENV: &str = "PATHOID_CONFIG";
pub const API_KEY_ENV: &str = "PATHOID_NCBI_API_KEY";
const DEFAULT_CONFIG_FILE: &str = "pathoid.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub clinvar: ClinVarConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub filter: FilterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinVarConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_retmax")]
    pub retmax: usize,
    #[serde(default = "default_requests_per_window")]
    pub requests_per_window: u32,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
    #[serde(default)]
    pub query_policy: QueryPolicy,
}

fn default_base_url()            -> String { EUTILS_BASE_URL.to_string() }
fn default_retmax()              -> usize  { DEFAULT_RETMAX }
fn default_requests_per_window() -> u32    { 3 }
fn default_window_ms()           -> u64    { 1_000 }
fn default_timeout_secs()        -> u64    { 30 }
fn default_progress_interval()   -> usize  { 10 }

impl Default for ClinVarConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            retmax: default_retmax(),
            requests_per_window: default_requests_per_window(),
            window_ms: default_window_ms(),
            timeout_secs: default_timeout_secs(),
            progress_interval: default_progress_interval(),
            query_policy: QueryPolicy::default(),
        }
    }
}

impl ClinVarConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(default)]
    pub columns: ColumnMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub mode: OutputMode,
    /// Directory for the report; defaults to the input file's directory.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Gene names; only annotation tokens mentioning one of them are searched.
    #[serde(default)]
    pub genes: Vec<String>,
}


impl Config {
    /// Load configuration.
    /// Uses `path` if given, then the PATHOID_CONFIG env var, then pathoid.toml
    /// in the current directory. A missing pathoid.toml yields defaults; a
    /// missing file that was named explicitly is an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match std::env::var(CONFIG_ENV) {
                Ok(p) => (PathBuf::from(p), true),
                Err(_) => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
            },
        };

        let mut config = if path.exists() {
            Self::load_file(&path)?
        } else if explicit {
            anyhow::bail!("Config file not found: {}", path.display());
        } else {
            tracing::debug!("No {DEFAULT_CONFIG_FILE} found; using defaults");
            Config::default()
        };

        config.apply_api_key(std::env::var(API_KEY_ENV).ok());
        Ok(config)
    }

    pub fn load_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {e}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// A non-empty key from the environment replaces the configured one.
    pub fn apply_api_key(&mut self, env_key: Option<String>) {
        if let Some(key) = env_key.filter(|k| !k.trim().is_empty()) {
            self.clinvar.api_key = Some(key);
        }
    }

    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            policy: self.clinvar.query_policy,
            retmax: self.clinvar.retmax,
            requests_per_window: self.clinvar.requests_per_window,
            window: Duration::from_millis(self.clinvar.window_ms),
            progress_interval: self.clinvar.progress_interval,
        }
    }
}
