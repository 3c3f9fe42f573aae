use std::env;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use rtunnel_core::config::ConfigLoader;
use rtunnel_core::{logging, Result};
use rtunnel_server::{AppArguments, Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let args = AppArguments::parse();
    logging::init(args.debug());

    let env_vars: Vec<(String, String)> = env::vars().collect();
    let config = match ServerConfig::load(&env_vars, &args) {
        Ok(config) => config,
        Err(err) => {
            error!("invalid configuration: {}", err);
            return Err(err.into());
        }
    };

    let mut server = match Server::bind(config).await {
        Ok(server) => server,
        Err(err) => {
            error!("failed to bind control listener: {}", err);
            return Err(err);
        }
    };

    server.run(signal::ctrl_c()).await?;

    info!("server stopped");
    Ok(())
}
