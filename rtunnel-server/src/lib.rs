mod args;
mod config;
mod server;
pub mod tunnel;

pub use args::AppArguments;
pub use config::*;
pub use server::Server;
