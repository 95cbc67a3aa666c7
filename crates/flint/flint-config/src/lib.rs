mod config;

pub use config::{ConfigError, FlintConfig};
