//! Loader configuration.
//!
//! A [`LoaderConfig`] is read once from YAML, adjusted by command-line
//! overrides, validated, and then handed by reference to every component.
//! Nothing reads configuration from global state.

use std::{
    collections::BTreeMap,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, ensure};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::{
    io_utils,
    records::{DEFAULT_NULL_MARKERS, ReadOptions},
    router::FileRouter,
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    pub options: LoadOptions,
    /// Replaces the built-in filename to table mapping when present.
    pub mappings: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    /// Local mirror of the storage container.
    pub directory: PathBuf,
    /// Sub-path inside the container.
    pub path: String,
    pub delimiter: Option<char>,
    pub encoding: Option<String>,
    pub null_markers: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            path: "/".to_string(),
            delimiter: None,
            encoding: None,
            null_markers: DEFAULT_NULL_MARKERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SourceConfig {
    /// Directory the extracts are listed from.
    pub fn root(&self) -> PathBuf {
        let relative = self.path.trim_matches('/');
        if relative.is_empty() {
            self.directory.clone()
        } else {
            self.directory.join(relative)
        }
    }

    pub fn read_options(&self) -> Result<ReadOptions> {
        let delimiter = match self.delimiter {
            Some(ch) => {
                ensure!(ch.is_ascii(), "Delimiter must be ASCII");
                ch as u8
            }
            None => io_utils::DEFAULT_CSV_DELIMITER,
        };
        Ok(ReadOptions {
            delimiter,
            encoding: io_utils::resolve_encoding(self.encoding.as_deref())?,
            null_markers: self.null_markers.clone(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DestinationConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: Option<SecretString>,
    pub connect_timeout_secs: u64,
    /// Leave the server's SQL mode untouched instead of clearing it per session.
    pub strict_mode: bool,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 3306,
            database: String::new(),
            username: String::new(),
            password: None,
            connect_timeout_secs: 30,
            strict_mode: false,
        }
    }
}

impl DestinationConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_ref().map(|secret| secret.expose_secret().as_str())
    }

    pub fn describe(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadOptions {
    pub create_missing_tables: bool,
    pub add_missing_columns: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            create_missing_tables: true,
            add_missing_columns: true,
        }
    }
}

impl LoaderConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config file {path:?}"))?;
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("Parsing config YAML")
    }

    /// Checks the settings a real destination needs.
    pub fn validate_destination(&self) -> Result<()> {
        ensure!(
            !self.destination.host.trim().is_empty(),
            "destination.host must be set"
        );
        ensure!(
            !self.destination.database.trim().is_empty(),
            "destination.database must be set"
        );
        ensure!(
            self.destination.connect_timeout_secs > 0,
            "destination.connect_timeout_secs must be positive"
        );
        Ok(())
    }

    pub fn router(&self) -> FileRouter {
        match &self.mappings {
            Some(mappings) => FileRouter::new(mappings.clone()),
            None => FileRouter::default(),
        }
    }
}
