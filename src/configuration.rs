pub mod config;
pub mod types;

pub use config::{Cli, Config};
pub use types::{ListenerConfig, RemoteSinkConfig};
