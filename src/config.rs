//! Host configuration.
//!
//! Usually loaded from a small TOML file:
//! ```toml
//! port = "/dev/ttyS1"
//! baudrate = 115200
//! max_devices_per_uri = 2
//! ```
//! Every key is optional.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_PORT: &str = "/dev/ttyS1";
pub const DEFAULT_BAUDRATE: u32 = 115_200;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Serial port path, handed to the transport.
    pub port: String,
    pub baudrate: u32,
    /// Refuse handshakes once this many devices share a model URI.
    pub max_devices_per_uri: Option<usize>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baudrate: DEFAULT_BAUDRATE,
            max_devices_per_uri: None,
        }
    }
}

impl HostConfig {
    pub fn new(port: impl Into<String>, baudrate: u32) -> Self {
        Self {
            port: port.into(),
            baudrate,
            ..Self::default()
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.port.is_empty() {
            return Err(Error::Config("port must not be empty".into()));
        }
        if self.baudrate == 0 {
            return Err(Error::Config("baudrate must be positive".into()));
        }
        if self.max_devices_per_uri == Some(0) {
            return Err(Error::Config("max_devices_per_uri must be at least 1".into()));
        }
        Ok(())
    }
}
