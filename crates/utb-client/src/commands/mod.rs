//! CLI command implementations

mod config;
mod generate;

pub use config::{config_get, config_init, config_path, config_set, config_show};
pub use generate::{default_channels, generate_command, GenerateTarget};
