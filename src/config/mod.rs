mod file_config;

pub use file_config::FileConfig;

use crate::object_store::S3Settings;
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub object_root: Option<PathBuf>,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub api_token: Option<String>,
    pub frontend_dir_path: Option<String>,
    pub max_upload_size: Option<String>,
    pub quota_max_total: Option<String>,
    pub sweep_interval_secs: u64,
    pub temp_max_age_secs: u64,
}

/// Which object store backend to run against.
#[derive(Debug, Clone)]
pub enum StorageSettings {
    Filesystem { root: PathBuf },
    S3(S3Settings),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub storage: StorageSettings,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    /// Bearer token required on /v1 routes. Absent means one is generated at
    /// startup and logged.
    pub api_token: Option<String>,
    pub frontend_dir_path: Option<String>,
    pub max_upload_bytes: u64,
    pub quota_max_total_bytes: Option<u64>,
    pub sweep_interval_secs: u64,
    pub temp_max_age_secs: u64,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via the CLI or in the config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        // An [s3] section selects the S3 backend; otherwise objects live on
        // the local filesystem next to the database by default.
        let storage = match file.s3 {
            Some(s3) => StorageSettings::S3(s3),
            None => {
                let root = file
                    .object_root
                    .map(PathBuf::from)
                    .or_else(|| cli.object_root.clone())
                    .unwrap_or_else(|| db_dir.join("objects"));
                StorageSettings::Filesystem { root }
            }
        };

        let port = file.port.unwrap_or(cli.port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let api_token = file.api_token.or_else(|| cli.api_token.clone());
        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());

        let max_upload_bytes = file
            .max_upload_size
            .or_else(|| cli.max_upload_size.clone())
            .map(|s| parse_byte_size(&s))
            .transpose()?
            .unwrap_or(2 * 1024 * 1024 * 1024);

        let quota_max_total_bytes = file
            .quota_max_total
            .or_else(|| cli.quota_max_total.clone())
            .map(|s| parse_byte_size(&s))
            .transpose()?;

        let sweep_interval_secs = file.sweep_interval_secs.unwrap_or(cli.sweep_interval_secs);
        if sweep_interval_secs == 0 {
            bail!("sweep_interval_secs must be greater than zero");
        }
        let temp_max_age_secs = file.temp_max_age_secs.unwrap_or(cli.temp_max_age_secs);

        Ok(Self {
            db_dir,
            storage,
            port,
            logging_level,
            api_token,
            frontend_dir_path,
            max_upload_bytes,
            quota_max_total_bytes,
            sweep_interval_secs,
            temp_max_age_secs,
        })
    }

    pub fn library_db_path(&self) -> PathBuf {
        self.db_dir.join("library.db")
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

/// Parse a human-readable byte size like "512 MiB".
fn parse_byte_size(s: &str) -> Result<u64> {
    let byte = byte_unit::Byte::parse_str(s, true)
        .with_context(|| format!("Invalid byte size: {}", s))?;
    Ok(byte.as_u64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_temp_db_dir() -> TempDir {
        TempDir::new().unwrap()
    }

    fn cli_with_db_dir(dir: &TempDir) -> CliConfig {
        CliConfig {
            db_dir: Some(dir.path().to_path_buf()),
            port: 3001,
            sweep_interval_secs: 3600,
            temp_max_age_secs: 86400,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_logging_level() {
        assert!(matches!(
            parse_logging_level("none"),
            Some(RequestsLoggingLevel::None)
        ));
        assert!(matches!(
            parse_logging_level("path"),
            Some(RequestsLoggingLevel::Path)
        ));
        assert!(matches!(
            parse_logging_level("PATH"),
            Some(RequestsLoggingLevel::Path)
        ));
        assert!(parse_logging_level("invalid").is_none());
    }

    #[test]
    fn test_parse_byte_size() {
        assert_eq!(parse_byte_size("1024").unwrap(), 1024);
        assert_eq!(parse_byte_size("2 KiB").unwrap(), 2048);
        assert_eq!(parse_byte_size("1 MiB").unwrap(), 1024 * 1024);
        assert!(parse_byte_size("lots").is_err());
    }

    #[test]
    fn test_resolve_cli_only() {
        let temp_dir = make_temp_db_dir();
        let mut cli = cli_with_db_dir(&temp_dir);
        cli.api_token = Some("token".to_string());
        cli.quota_max_total = Some("1 KiB".to_string());

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.db_dir, temp_dir.path());
        assert_eq!(config.port, 3001);
        assert_eq!(config.api_token.as_deref(), Some("token"));
        assert_eq!(config.quota_max_total_bytes, Some(1024));
        assert!(matches!(
            config.storage,
            StorageSettings::Filesystem { ref root } if root == &temp_dir.path().join("objects")
        ));
        assert_eq!(
            config.library_db_path(),
            temp_dir.path().join("library.db")
        );
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let temp_dir = make_temp_db_dir();
        let cli = cli_with_db_dir(&temp_dir);

        let file_config = FileConfig {
            port: Some(4000),
            logging_level: Some("headers".to_string()),
            max_upload_size: Some("1 MiB".to_string()),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        assert_eq!(config.port, 4000);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Headers);
        assert_eq!(config.max_upload_bytes, 1024 * 1024);
        // CLI value used when TOML doesn't specify
        assert_eq!(config.sweep_interval_secs, 3600);
    }

    #[test]
    fn test_resolve_s3_section_selects_backend() {
        let temp_dir = make_temp_db_dir();
        let cli = cli_with_db_dir(&temp_dir);

        let file_config: FileConfig = toml::from_str(
            r#"
            [s3]
            endpoint_url = "http://minio:9000"
            bucket = "phonoteca"
            access_key = "ak"
            secret_key = "sk"
            "#,
        )
        .unwrap();

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();
        assert!(matches!(config.storage, StorageSettings::S3(_)));
    }

    #[test]
    fn test_resolve_missing_db_dir_error() {
        let cli = CliConfig {
            sweep_interval_secs: 3600,
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("db_dir must be specified"));
    }

    #[test]
    fn test_resolve_nonexistent_db_dir_error() {
        let cli = CliConfig {
            db_dir: Some(PathBuf::from("/nonexistent/path/that/should/not/exist")),
            sweep_interval_secs: 3600,
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("does not exist"));
    }

    #[test]
    fn test_resolve_zero_sweep_interval_error() {
        let temp_dir = make_temp_db_dir();
        let mut cli = cli_with_db_dir(&temp_dir);
        cli.sweep_interval_secs = 0;

        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
    }
}
