use std::path::{Path, PathBuf};

use clap::Parser;

/// Reverse tunnel client: keeps a control connection to an `rtunnel-server`
/// open and forwards every connection it carries to a local service.
#[derive(Parser, Debug, Default)]
#[clap(author, version, about, long_about = None)]
pub struct ClientArgs {
    /// JSON config file. a default one is written there if it does not exist.
    #[clap(short, long, value_parser)]
    config: Option<PathBuf>,

    /// server control address, as host:port.
    #[clap(short = 'S', long, value_parser)]
    server: Option<String>,

    /// local service to expose, as host:port.
    #[clap(short, long, value_parser)]
    local: Option<String>,

    /// port of the local service on the configured local host.
    #[clap(short, long, value_parser)]
    port: Option<u16>,

    /// shared secret sent to the server right after connecting.
    #[clap(short, long, value_parser)]
    secret: Option<String>,

    /// connection attempts before giving up.
    #[clap(short = 'm', long, value_parser)]
    max_attempts: Option<u32>,

    /// seconds to wait between connection attempts.
    #[clap(short = 'r', long, value_parser)]
    retry_delay: Option<f64>,

    #[clap(short, long)]
    debug: bool,
}

impl ClientArgs {
    pub fn new(
        config: Option<PathBuf>,
        server: Option<&str>,
        local: Option<&str>,
        port: Option<u16>,
        secret: Option<&str>,
    ) -> Self {
        Self {
            config,
            server: server.map(str::to_owned),
            local: local.map(str::to_owned),
            port,
            secret: secret.map(str::to_owned),
            ..Default::default()
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, retry_delay: f64) -> Self {
        self.max_attempts = Some(max_attempts);
        self.retry_delay = Some(retry_delay);
        self
    }

    pub fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }

    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    pub fn local(&self) -> Option<&str> {
        self.local.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    pub fn retry_delay(&self) -> Option<f64> {
        self.retry_delay
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }
}
