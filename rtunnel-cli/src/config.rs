use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use rtunnel_core::config::{duration_from_secs, parse_host_port, parse_value, Config, ConfigError, ConfigLoader};
use rtunnel_core::control::ControlOptions;

use crate::{ClientArgs, RetryPolicy};

pub mod env {
    pub const SERVER: &str = "RTUNNEL_SERVER";
    pub const LOCAL_TARGET: &str = "RTUNNEL_LOCAL_TARGET";
    pub const SECRET: &str = "RTUNNEL_SECRET";
    pub const CONFIG_FILE: &str = "RTUNNEL_CONFIG_FILE";
}

const DEFAULT_CONFIG_FILE: &str = "./rtunnel.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    server_host: String,
    server_port: u16,
    local_host: String,
    local_port: u16,
    secret: Option<String>,
    max_attempts: u32,
    retry_delay_secs: f64,
    connect_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_owned(),
            server_port: 4777,
            local_host: "127.0.0.1".to_owned(),
            local_port: 0,
            secret: None,
            max_attempts: 5,
            retry_delay_secs: 10.0,
            connect_timeout_secs: 5,
        }
    }
}

impl ClientConfig {
    pub fn new(server_addr: (&str, u16), local_addr: (&str, u16), secret: Option<&str>) -> Self {
        Self {
            server_host: server_addr.0.to_owned(),
            server_port: server_addr.1,
            local_host: local_addr.0.to_owned(),
            local_port: local_addr.1,
            secret: secret.map(str::to_owned),
            ..Default::default()
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.retry_delay_secs = delay.as_secs_f64();
        self
    }

    pub fn server_addr(&self) -> String {
        join_host_port(&self.server_host, self.server_port)
    }

    pub fn local_addr(&self) -> String {
        join_host_port(&self.local_host, self.local_port)
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay: Duration::try_from_secs_f64(self.retry_delay_secs).unwrap_or(Duration::MAX),
            reset_on_connect: false,
        }
    }

    pub fn control_options(&self) -> ControlOptions {
        ControlOptions {
            secret: self.secret.clone(),
            connect_timeout: self.connect_timeout(),
            ..Default::default()
        }
    }

    fn set_secret(&mut self, secret: &str) {
        self.secret = match secret.is_empty() {
            true => None,
            false => Some(secret.to_owned()),
        };
    }
}

fn join_host_port(host: &str, port: u16) -> String {
    match host.contains(':') {
        true => format!("[{}]:{}", host, port),
        false => format!("{}:{}", host, port),
    }
}

impl Config<ClientArgs> for ClientConfig {
    fn apply_env(&mut self, env: &HashMap<String, String>) -> Result<(), ConfigError> {
        for (name, value) in env {
            match name.as_str() {
                env::SERVER => (self.server_host, self.server_port) = parse_host_port(name, value)?,
                env::LOCAL_TARGET => (self.local_host, self.local_port) = parse_host_port(name, value)?,
                env::SECRET => self.set_secret(value),
                _ => continue,
            }
        }

        Ok(())
    }

    fn apply_args(&mut self, args: &ClientArgs) -> Result<(), ConfigError> {
        if let Some(server) = args.server() {
            (self.server_host, self.server_port) = parse_host_port("--server", server)?;
        }

        if let Some(local) = args.local() {
            (self.local_host, self.local_port) = parse_host_port("--local", local)?;
        }

        if let Some(port) = args.port() {
            self.local_port = port;
        }

        if let Some(secret) = args.secret() {
            self.set_secret(secret);
        }

        if let Some(max_attempts) = args.max_attempts() {
            self.max_attempts = max_attempts;
        }

        if let Some(retry_delay) = args.retry_delay() {
            self.retry_delay_secs = retry_delay;
        }

        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server_host.trim().is_empty() || self.local_host.trim().is_empty() {
            return Err(ConfigError::Invalid("hosts cannot be empty".to_owned()));
        }

        if self.server_port == 0 {
            return Err(ConfigError::Invalid("server port cannot be zero".to_owned()));
        }

        if self.local_port == 0 {
            return Err(ConfigError::Invalid(
                "local port is required, use --local host:port or --port".to_owned(),
            ));
        }

        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max attempts must be at least 1".to_owned()));
        }

        duration_from_secs("retry_delay_secs", self.retry_delay_secs)?;

        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid("connect timeout must be positive".to_owned()));
        }

        Ok(())
    }
}

impl ConfigLoader<ClientArgs> for ClientConfig {
    fn named_environment_variables() -> HashSet<&'static str> {
        HashSet::from([env::SERVER, env::LOCAL_TARGET, env::SECRET, env::CONFIG_FILE])
    }

    fn config_path(env: &HashMap<String, String>, args: &ClientArgs) -> PathBuf {
        if let Some(path) = args.config() {
            return path.to_owned();
        }

        env.get(env::CONFIG_FILE)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }
}
