//! Optional TOML configuration file.

use crate::object_store::S3Settings;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Values readable from a TOML config file. Every field is optional; present
/// values override the matching CLI arguments.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub db_dir: Option<String>,
    /// Root directory for the filesystem object store. Ignored when [s3] is
    /// configured.
    pub object_root: Option<String>,
    pub port: Option<u16>,
    pub logging_level: Option<String>,
    pub api_token: Option<String>,
    pub frontend_dir_path: Option<String>,
    /// Human readable, e.g. "2 GiB".
    pub max_upload_size: Option<String>,
    /// Cap over total stored bytes, e.g. "50 GiB". Absent disables the quota.
    pub quota_max_total: Option<String>,
    pub sweep_interval_secs: Option<u64>,
    pub temp_max_age_secs: Option<u64>,
    /// S3-compatible endpoint settings; presence selects the S3 backend.
    pub s3: Option<S3Settings>,
}

impl FileConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Error reading config file {:?}", path.as_ref()))?;
        toml::from_str(&content)
            .with_context(|| format!("Error parsing config file {:?}", path.as_ref()))
    }
}
