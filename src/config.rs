use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::{is_valid_label, DEFAULT_LABEL};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "./config/backup.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackupConfig {
    #[serde(default = "default_backup_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_label")]
    pub default_label: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: default_backup_dir(),
            default_label: default_label(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("./backups")
}
fn default_label() -> String {
    DEFAULT_LABEL.to_string()
}
fn default_retention_days() -> u64 {
    7
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourcesConfig {
    #[serde(default = "default_vector_store")]
    pub vector_store: PathBuf,
    #[serde(default = "default_documents")]
    pub documents: PathBuf,
    #[serde(default = "default_config_files")]
    pub config_files: Vec<PathBuf>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            vector_store: default_vector_store(),
            documents: default_documents(),
            config_files: default_config_files(),
        }
    }
}

fn default_vector_store() -> PathBuf {
    PathBuf::from("./chroma_db")
}
fn default_documents() -> PathBuf {
    PathBuf::from("./documents")
}
fn default_config_files() -> Vec<PathBuf> {
    vec![PathBuf::from(".env"), PathBuf::from("config/app.toml")]
}

#[derive(Debug, Deserialize, Clone)]
pub struct SupervisorConfig {
    #[serde(default = "default_process_patterns")]
    pub process_patterns: Vec<String>,
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            process_patterns: default_process_patterns(),
            stop_grace_secs: default_stop_grace_secs(),
        }
    }
}

fn default_process_patterns() -> Vec<String> {
    vec!["streamlit run".to_string()]
}
fn default_stop_grace_secs() -> u64 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

/// Resolve the configuration for a CLI invocation.
///
/// An explicit path must exist. Without one, the default path is used when
/// present and built-in defaults otherwise.
pub fn load_or_default(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => load_config(path),
        None => {
            let path = Path::new(DEFAULT_CONFIG_PATH);
            if path.exists() {
                load_config(path)
            } else {
                Ok(Config::default())
            }
        }
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.backup.dir.as_os_str().is_empty() {
        anyhow::bail!("backup.dir must not be empty");
    }

    if !is_valid_label(&config.backup.default_label) {
        anyhow::bail!(
            "backup.default_label '{}' may only contain letters, digits, '-', '_' or '.'",
            config.backup.default_label
        );
    }

    if config
        .supervisor
        .process_patterns
        .iter()
        .any(|p| p.trim().is_empty())
    {
        anyhow::bail!("supervisor.process_patterns must not contain empty patterns");
    }

    Ok(())
}
