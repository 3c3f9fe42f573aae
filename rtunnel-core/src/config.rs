use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write default config file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("config file {path} is not valid: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("invalid value {value:?} for {name}")]
    InvalidValue { name: String, value: String },
    #[error("{0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid_value(name: &str, value: &str) -> Self {
        ConfigError::InvalidValue {
            name: name.to_owned(),
            value: value.to_owned(),
        }
    }
}

pub trait Config<Args> {
    fn apply_env(&mut self, env: &HashMap<String, String>) -> Result<(), ConfigError>;
    fn apply_args(&mut self, args: &Args) -> Result<(), ConfigError>;
    fn validate(&self) -> Result<(), ConfigError>;
}

/// layered configuration: file, then environment, then arguments.
pub trait ConfigLoader<Args>: Config<Args> + Serialize + DeserializeOwned + Default {
    /// environment variables this config reads.
    fn named_environment_variables() -> HashSet<&'static str>;

    /// gets where config should be read from.
    fn config_path(env: &HashMap<String, String>, args: &Args) -> PathBuf;

    fn load(env_vars: &[(String, String)], args: &Args) -> Result<Self, ConfigError> {
        let parsed_env_vars = Self::parse_environment_variables(env_vars);
        let config_path = Self::config_path(&parsed_env_vars, args);

        if !config_path.exists() {
            debug!("config file {} doesnt exist. creating default...", config_path.display());
            Self::create_default(&config_path)?;
        }

        let mut config = Self::read_from_file(&config_path)?;

        config.apply_env(&parsed_env_vars)?;
        config.apply_args(args)?;
        config.validate()?;

        Ok(config)
    }

    fn parse_environment_variables(env_vars: &[(String, String)]) -> HashMap<String, String> {
        let available_env_vars = Self::named_environment_variables();

        env_vars
            .iter()
            .filter(|(key, _)| available_env_vars.contains(key.as_str()))
            .map(|(key, value)| (key.to_owned(), value.to_owned()))
            .collect()
    }

    fn read_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;

        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    fn create_default(path: &Path) -> Result<(), ConfigError> {
        let config = Self::default();
        let contents = serde_json::to_string_pretty(&config).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;

        fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_owned(),
            source,
        })
    }
}

pub fn parse_value<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::invalid_value(name, value))
}

/// turns a seconds value into a duration. negative, NaN and out of range
/// values are rejected.
pub fn duration_from_secs(name: &str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::invalid_value(name, &secs.to_string()))
}

/// splits `host:port`. the host may be a bracketed ipv6 literal.
pub fn parse_host_port(name: &str, value: &str) -> Result<(String, u16), ConfigError> {
    let (host, port) = value
        .trim()
        .rsplit_once(':')
        .ok_or_else(|| ConfigError::invalid_value(name, value))?;

    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(ConfigError::invalid_value(name, value));
    }

    let port = parse_value::<u16>(name, port)?;
    Ok((host.to_owned(), port))
}
