use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use super::ConfigError;

struct Defaults {}

impl Defaults {
    fn use_neighbors_meta() -> bool {
        false
    }

    fn use_deployment_id() -> bool {
        false
    }

    fn general() -> PeerSpec {
        PeerSpec {
            template_dir: "general".to_string(),
        }
    }

    fn dynamic() -> PeerSpec {
        PeerSpec {
            template_dir: "dynamic".to_string(),
        }
    }

    fn monitors() -> PeerSpec {
        PeerSpec {
            template_dir: "monitors".to_string(),
        }
    }

    fn wait_for() -> Vec<String> {
        vec!["bgpd".to_string(), "zebra".to_string(), "staticd".to_string()]
    }

    fn wait_timeout_secs() -> u64 {
        20
    }
}

/// Per peer-kind settings
#[derive(Clone, Debug, Deserialize)]
pub(super) struct PeerSpec {
    // Template family used to render this kind of peer
    pub(super) template_dir: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct PeersSpec {
    #[serde(default = "Defaults::general")]
    pub(super) general: PeerSpec,
    #[serde(default = "Defaults::dynamic")]
    pub(super) dynamic: PeerSpec,
    #[serde(default = "Defaults::monitors")]
    pub(super) monitors: PeerSpec,
}

impl Default for PeersSpec {
    fn default() -> Self {
        Self {
            general: Defaults::general(),
            dynamic: Defaults::dynamic(),
            monitors: Defaults::monitors(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct BgpSpec {
    // Hold general peers until their DEVICE_NEIGHBOR_METADATA entry exists
    #[serde(default = "Defaults::use_neighbors_meta")]
    pub(super) use_neighbors_meta: bool,
    // Require DEVICE_METADATA|localhost deployment_id before installing peers
    #[serde(default = "Defaults::use_deployment_id")]
    pub(super) use_deployment_id: bool,
    #[serde(default)]
    pub(super) peers: PeersSpec,
}

impl Default for BgpSpec {
    fn default() -> Self {
        Self {
            use_neighbors_meta: Defaults::use_neighbors_meta(),
            use_deployment_id: Defaults::use_deployment_id(),
            peers: PeersSpec::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct DaemonSpec {
    // FRR daemons that must be running before any manager starts
    #[serde(default = "Defaults::wait_for")]
    pub(super) wait_for: Vec<String>,
    #[serde(default = "Defaults::wait_timeout_secs")]
    pub(super) wait_timeout_secs: u64,
}

impl Default for DaemonSpec {
    fn default() -> Self {
        Self {
            wait_for: Defaults::wait_for(),
            wait_timeout_secs: Defaults::wait_timeout_secs(),
        }
    }
}

/// Constants (toml) representation
#[derive(Debug, Default, Deserialize)]
pub(super) struct ConstantsSpec {
    #[serde(default)]
    pub(super) bgp: BgpSpec,
    #[serde(default)]
    pub(super) daemon: DaemonSpec,
}

impl ConstantsSpec {
    pub(super) fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Self::from_toml(&contents)
    }

    pub(super) fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }
}
