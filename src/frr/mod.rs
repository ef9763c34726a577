//! Access to the running FRR instance: pushing configuration and reading
//! back the state the daemon needs at startup.
mod vtysh;

pub use vtysh::Vtysh;

use std::collections::{BTreeMap, BTreeSet};
use std::error;
use std::fmt;
use std::io;
use std::time::Duration;

use log::{debug, info};
use tokio::time::{sleep, Instant};

/// VRF name -> neighbors configured in that VRF
pub type LivePeers = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug)]
pub enum FrrError {
    /// vtysh couldn't be started. [reason]
    Spawn(String),
    /// vtysh exited with an error. [command, exit code, stderr]
    Command(String, Option<i32>, String),
    /// Unexpected vtysh output. [command, reason]
    Output(String, String),
    /// Daemons still missing after waiting. [missing, seconds]
    DaemonsNotReady(Vec<String>, u64),
}

impl fmt::Display for FrrError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("FRR Error: ")?;
        use FrrError::*;
        match self {
            Spawn(r) => write!(f, "Can't run vtysh [{}]", r)?,
            Command(cmd, code, err) => {
                write!(f, "'{}' failed (rc={:?}) [{}]", cmd, code, err.trim())?
            }
            Output(cmd, r) => write!(f, "Unexpected output from '{}' [{}]", cmd, r)?,
            DaemonsNotReady(missing, secs) => write!(
                f,
                "FRR daemons {} are not ready in {} seconds",
                missing.join(", "),
                secs
            )?,
        }
        Ok(())
    }
}

impl From<io::Error> for FrrError {
    fn from(error: io::Error) -> Self {
        FrrError::Spawn(error.to_string())
    }
}

impl error::Error for FrrError {
    fn description(&self) -> &str {
        "FRR Error"
    }
}

/// The routing process, as seen by the managers
pub trait Frr {
    /// Apply configuration text. Returns true if it was accepted.
    fn push(&self, cmd: &str) -> bool;

    /// Neighbors currently configured, per VRF
    fn live_peers(&self) -> Result<LivePeers, FrrError>;

    /// Names of the FRR daemons that are up
    fn running_daemons(&self) -> Result<Vec<String>, FrrError>;
}

/// Keys of the `vrfs` object in `show bgp vrfs json`
pub fn parse_vrfs(output: &str) -> Result<Vec<String>, String> {
    let value: serde_json::Value = serde_json::from_str(output).map_err(|e| e.to_string())?;
    match value.get("vrfs").and_then(|vrfs| vrfs.as_object()) {
        Some(vrfs) => Ok(vrfs.keys().cloned().collect()),
        None => Err("missing 'vrfs' object".to_string()),
    }
}

/// Top-level keys of `show bgp vrf <vrf> neighbors json`
pub fn parse_neighbors(output: &str) -> Result<Vec<String>, String> {
    let value: serde_json::Value = serde_json::from_str(output).map_err(|e| e.to_string())?;
    match value.as_object() {
        Some(neighbors) => Ok(neighbors.keys().cloned().collect()),
        None => Err("expected a JSON object".to_string()),
    }
}

/// Poll until every daemon in `daemons` reports running
pub async fn wait_for_daemons(
    frr: &dyn Frr,
    daemons: &[String],
    timeout: Duration,
) -> Result<(), FrrError> {
    let deadline = Instant::now() + timeout;
    loop {
        let running = frr.running_daemons().unwrap_or_else(|err| {
            debug!("Can't list FRR daemons yet: {}", err);
            vec![]
        });
        let missing: Vec<String> = daemons
            .iter()
            .filter(|d| !running.contains(d))
            .cloned()
            .collect();
        if missing.is_empty() {
            info!("FRR daemons {} are ready", daemons.join(", "));
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(FrrError::DaemonsNotReady(missing, timeout.as_secs()));
        }
        debug!("Waiting for FRR daemons: {}", missing.join(", "));
        sleep(Duration::from_secs(1)).await;
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_parse_vrfs() {
        let output = r#"{"vrfs": {"default": {"vrfId": 0}, "Vrf-red": {"vrfId": 5}}}"#;
        let mut vrfs = parse_vrfs(output).unwrap();
        vrfs.sort();
        assert_eq!(vrfs, vec!["Vrf-red", "default"]);
        assert!(parse_vrfs("{}").is_err());
        assert!(parse_vrfs("% bgpd is not running").is_err());
    }

    #[test]
    fn test_parse_neighbors() {
        let output = r#"{"10.0.0.57": {"remoteAs": 64600}, "fc00::72": {"remoteAs": 64600}}"#;
        assert_eq!(parse_neighbors(output).unwrap(), vec!["10.0.0.57", "fc00::72"]);
        assert!(parse_neighbors("{}").unwrap().is_empty());
        assert!(parse_neighbors("[]").is_err());
    }

    struct Daemons {
        calls: Cell<usize>,
        ready_after: usize,
    }

    impl Frr for Daemons {
        fn push(&self, _cmd: &str) -> bool {
            true
        }

        fn live_peers(&self) -> Result<LivePeers, FrrError> {
            Ok(LivePeers::new())
        }

        fn running_daemons(&self) -> Result<Vec<String>, FrrError> {
            self.calls.set(self.calls.get() + 1);
            if self.calls.get() > self.ready_after {
                Ok(vec!["zebra".to_string(), "bgpd".to_string()])
            } else {
                Ok(vec!["zebra".to_string()])
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_daemons() {
        let frr = Daemons {
            calls: Cell::new(0),
            ready_after: 2,
        };
        let daemons = vec!["bgpd".to_string(), "zebra".to_string()];
        wait_for_daemons(&frr, &daemons, Duration::from_secs(20))
            .await
            .unwrap();
        assert_eq!(frr.calls.get(), 3);

        let frr = Daemons {
            calls: Cell::new(0),
            ready_after: 100,
        };
        match wait_for_daemons(&frr, &daemons, Duration::from_secs(3)).await {
            Err(FrrError::DaemonsNotReady(missing, 3)) => assert_eq!(missing, vec!["bgpd"]),
            other => panic!("Unexpected result: {:?}", other),
        }
    }
}
