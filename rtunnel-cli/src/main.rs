use std::env;

use clap::Parser;
use tokio::signal;
use tracing::error;

use rtunnel_cli::{App, ClientArgs, ClientConfig};
use rtunnel_core::config::ConfigLoader;
use rtunnel_core::{logging, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let args = ClientArgs::parse();
    logging::init(args.is_debug());

    let env_vars: Vec<(String, String)> = env::vars().collect();
    let config = match ClientConfig::load(&env_vars, &args) {
        Ok(config) => config,
        Err(err) => {
            error!("invalid configuration: {}", err);
            return Err(err.into());
        }
    };

    App::new(config).run(signal::ctrl_c()).await
}
