use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output};

use log::{debug, error, trace};
use tempfile::NamedTempFile;

use super::{parse_neighbors, parse_vrfs, Frr, FrrError, LivePeers};

/// Talks to FRR through the `vtysh` shell
#[derive(Debug)]
pub struct Vtysh {
    binary: PathBuf,
}

impl Vtysh {
    pub fn new<P: Into<PathBuf>>(binary: P) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<Output, FrrError> {
        trace!("Running {} {}", self.binary.display(), args.join(" "));
        Ok(Command::new(&self.binary).args(args).output()?)
    }

    /// Run `vtysh -c <command>` and return stdout, failing on a non-zero exit
    fn show(&self, command: &str) -> Result<String, FrrError> {
        let output = self.run(&["-c", command])?;
        if !output.status.success() {
            return Err(FrrError::Command(
                command.to_string(),
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn write_config(&self, cmd: &str) -> Result<Output, FrrError> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "{}", cmd)?;
        file.flush()?;
        let path = file.path().to_string_lossy().to_string();
        self.run(&["-f", &path])
    }
}

impl Frr for Vtysh {
    fn push(&self, cmd: &str) -> bool {
        match self.write_config(cmd) {
            Ok(output) if output.status.success() => {
                debug!("Pushed configuration:\n{}", cmd);
                true
            }
            Ok(output) => {
                error!(
                    "Can't push configuration '{}', rc='{:?}', stdout='{}', stderr='{}'",
                    cmd,
                    output.status.code(),
                    String::from_utf8_lossy(&output.stdout).trim(),
                    String::from_utf8_lossy(&output.stderr).trim(),
                );
                false
            }
            Err(err) => {
                error!("Can't push configuration '{}': {}", cmd, err);
                false
            }
        }
    }

    fn live_peers(&self) -> Result<LivePeers, FrrError> {
        let command = "show bgp vrfs json";
        let vrfs = parse_vrfs(&self.show(command)?)
            .map_err(|err| FrrError::Output(command.to_string(), err))?;
        let mut peers = LivePeers::new();
        for vrf in vrfs {
            let command = format!("show bgp vrf {} neighbors json", vrf);
            let neighbors = parse_neighbors(&self.show(&command)?)
                .map_err(|err| FrrError::Output(command.clone(), err))?;
            peers.insert(vrf, neighbors.into_iter().collect::<BTreeSet<_>>());
        }
        Ok(peers)
    }

    fn running_daemons(&self) -> Result<Vec<String>, FrrError> {
        let output = self.show("show daemons")?;
        Ok(output.split_whitespace().map(str::to_string).collect())
    }
}
