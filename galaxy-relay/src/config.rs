//! Relay settings: where to listen and how much a single relay will host.
//!
//! Each setting is taken from the first layer that provides it: command
//! line, environment (through clap), the `[server]` table of
//! `<config_dir>/galaxy-relay/config.toml`, then the registry defaults.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::rooms::{DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_MAX_ROOMS};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:1999";

/// Errors that can occur when loading relay configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists (or was named explicitly) but could not be read.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for the `[server]` table.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

/// On-disk layout. Every key is optional so a file may override a subset.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct FileLayer {
    server: ServerTable,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerTable {
    bind_addr: Option<String>,
    max_message_size: Option<usize>,
    max_rooms: Option<usize>,
}

/// Command line of the `galaxy-relay` binary.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Galaxy Explorer presence relay")]
pub struct RelayCliArgs {
    /// Address to listen on.
    #[arg(short, long, env = "RELAY_ADDR")]
    pub bind: Option<String>,

    /// Config file to read instead of the default location.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Largest inbound text frame, in bytes.
    #[arg(long)]
    pub max_message_size: Option<usize>,

    /// Most solar systems hosted at once.
    #[arg(long)]
    pub max_rooms: Option<usize>,

    /// `tracing` filter directive.
    #[arg(long, default_value = "info", env = "RELAY_LOG")]
    pub log_level: String,
}

/// Settings the relay runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Listen address, e.g. `0.0.0.0:1999`.
    pub bind_addr: String,
    /// Largest inbound text frame, in bytes.
    pub max_message_size: usize,
    /// Most rooms the registry will run at once.
    pub max_rooms: usize,
    /// `tracing` filter directive.
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_rooms: DEFAULT_MAX_ROOMS,
            log_level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Builds the configuration for `cli`, reading the config file it names
    /// or, failing that, the default one if present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an explicitly named file is missing, or if
    /// any config file cannot be read or parsed.
    pub fn load(cli: &RelayCliArgs) -> Result<Self, ConfigError> {
        let file = match cli.config.as_deref() {
            Some(path) => read_layer(path, true)?,
            None => match default_path() {
                Some(path) => read_layer(&path, false)?,
                None => FileLayer::default(),
            },
        };
        Ok(Self::merge(cli, file))
    }

    fn merge(cli: &RelayCliArgs, file: FileLayer) -> Self {
        let ServerTable {
            bind_addr,
            max_message_size,
            max_rooms,
        } = file.server;

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or(bind_addr)
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            max_message_size: cli
                .max_message_size
                .or(max_message_size)
                .unwrap_or(DEFAULT_MAX_MESSAGE_SIZE),
            max_rooms: cli.max_rooms.or(max_rooms).unwrap_or(DEFAULT_MAX_ROOMS),
            log_level: cli.log_level.clone(),
        }
    }
}

fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("galaxy-relay").join("config.toml"))
}

/// Reads one config file. A missing file is only an error when `required`.
fn read_layer(path: &Path, required: bool) -> Result<FileLayer, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if !required && e.kind() == ErrorKind::NotFound => Ok(FileLayer::default()),
        Err(source) => Err(ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}
