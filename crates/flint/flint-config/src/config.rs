use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize, Debug)]
pub struct FlintConfig {
    /// Directory holding the segment files.
    #[serde(default = "defaults::runtime_dir")]
    pub runtime_dir: String,
    /// The durable handle row.
    #[serde(default = "defaults::directory_file")]
    pub directory_file: String,
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),
}

mod defaults {
    pub fn runtime_dir() -> String {
        "/tmp/flint".into()
    }

    pub fn directory_file() -> String {
        "/tmp/flint/handle.toml".into()
    }

    pub fn log_level() -> String {
        "info".into()
    }
}

impl Default for FlintConfig {
    fn default() -> Self {
        Self {
            runtime_dir: defaults::runtime_dir(),
            directory_file: defaults::directory_file(),
            log_level: defaults::log_level(),
        }
    }
}

impl FlintConfig {
    pub fn load(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        let toml_to_str = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let config: FlintConfig = toml::from_str(&toml_to_str)?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to the defaults.
    /// A present-but-broken file is still an error.
    pub fn load_or_default(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}
