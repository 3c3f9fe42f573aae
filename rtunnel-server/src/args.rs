use std::net::IpAddr;
use std::path::{Path, PathBuf};

use clap::Parser;

/// Reverse tunnel server: exposes a port whose connections are carried over
/// a single control connection to an `rtunnel` client.
#[derive(Parser, Debug, Default)]
#[clap(author, version, about, long_about = None)]
pub struct AppArguments {
    /// JSON config file. a default one is written there if it does not exist.
    #[clap(short, long, value_parser)]
    config: Option<PathBuf>,

    /// address both listeners bind to.
    #[clap(short, long, value_parser)]
    ip: Option<IpAddr>,

    /// port the client connects its control connection to.
    #[clap(short = 'p', long, value_parser)]
    control_port: Option<u16>,

    /// public port forwarded to the client's local service.
    #[clap(short, long, value_parser)]
    exposed_port: Option<u16>,

    /// shared secret the client must send before anything else.
    #[clap(short, long, value_parser)]
    secret: Option<String>,

    /// seconds the exposed port stays open after the client disconnects.
    #[clap(short, long, value_parser)]
    grace_period: Option<f64>,

    #[clap(short, long)]
    debug: bool,
}

impl AppArguments {
    pub fn new(
        config: Option<PathBuf>,
        ip: Option<IpAddr>,
        control_port: Option<u16>,
        exposed_port: Option<u16>,
        secret: Option<String>,
        grace_period: Option<f64>,
    ) -> Self {
        Self {
            config,
            ip,
            control_port,
            exposed_port,
            secret,
            grace_period,
            debug: false,
        }
    }

    pub fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.ip
    }

    pub fn control_port(&self) -> Option<u16> {
        self.control_port
    }

    pub fn exposed_port(&self) -> Option<u16> {
        self.exposed_port
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    pub fn grace_period(&self) -> Option<f64> {
        self.grace_period
    }

    pub fn debug(&self) -> bool {
        self.debug
    }
}
