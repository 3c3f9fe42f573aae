mod app;
mod args;
mod config;
mod local_connector;
mod supervisor;

pub use app::*;
pub use args::*;
pub use config::*;
pub use local_connector::*;
pub use supervisor::*;
