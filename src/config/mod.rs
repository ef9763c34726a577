mod file;

use std::error;
use std::fmt;
use std::io;
use std::path::Path;
use std::time::Duration;

use crate::managers::PeerKind;

#[derive(Debug)]
pub enum ConfigError {
    /// Constants file couldn't be read. [reason]
    Io(String),
    /// Constants file isn't valid. [reason]
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Config Error: ")?;
        match self {
            ConfigError::Io(r) => write!(f, "Can't read constants [{}]", r),
            ConfigError::Parse(r) => write!(f, "Invalid constants [{}]", r),
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(error: io::Error) -> Self {
        ConfigError::Io(error.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(error: toml::de::Error) -> Self {
        ConfigError::Parse(error.to_string())
    }
}

impl error::Error for ConfigError {
    fn description(&self) -> &str {
        "Config Error"
    }
}

/// Daemon-wide constants, read once at startup
#[derive(Clone, Debug)]
pub struct Constants {
    pub use_neighbors_meta: bool,
    pub use_deployment_id: bool,
    pub general_template_dir: String,
    pub dynamic_template_dir: String,
    pub monitors_template_dir: String,
    pub wait_for: Vec<String>,
    pub wait_timeout: Duration,
}

impl Constants {
    /// Parse a TOML constants file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Ok(Self::from_spec(file::ConstantsSpec::from_file(path)?))
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(Self::from_spec(file::ConstantsSpec::from_toml(contents)?))
    }

    pub fn template_dir(&self, kind: PeerKind) -> &str {
        match kind {
            PeerKind::General => &self.general_template_dir,
            PeerKind::Dynamic => &self.dynamic_template_dir,
            PeerKind::Monitors => &self.monitors_template_dir,
        }
    }

    fn from_spec(spec: file::ConstantsSpec) -> Self {
        Self {
            use_neighbors_meta: spec.bgp.use_neighbors_meta,
            use_deployment_id: spec.bgp.use_deployment_id,
            general_template_dir: spec.bgp.peers.general.template_dir,
            dynamic_template_dir: spec.bgp.peers.dynamic.template_dir,
            monitors_template_dir: spec.bgp.peers.monitors.template_dir,
            wait_for: spec.daemon.wait_for,
            wait_timeout: Duration::from_secs(spec.daemon.wait_timeout_secs),
        }
    }
}

impl Default for Constants {
    fn default() -> Self {
        Self::from_spec(file::ConstantsSpec::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_dirs() {
        let constants =
            Constants::from_toml("[bgp.peers.dynamic]\ntemplate_dir = \"dynamic_v2\"\n").unwrap();
        assert_eq!(constants.template_dir(PeerKind::General), "general");
        assert_eq!(constants.template_dir(PeerKind::Dynamic), "dynamic_v2");
        assert_eq!(constants.template_dir(PeerKind::Monitors), "monitors");
        assert_eq!(constants.wait_timeout, Duration::from_secs(20));
    }
}
