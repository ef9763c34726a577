use std::error;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use log::{debug, info};
use signal_hook::consts::{SIGINT, SIGTERM};
use tokio::io::BufReader;

use crate::config::{ConfigError, Constants};
use crate::directory::{Database, Directory, Slot};
use crate::dispatcher::{Dispatcher, EventSource, JsonLinesSource, TransportError};
use crate::frr::{wait_for_daemons, Frr, FrrError, Vtysh};
use crate::managers::{
    AllowListManager, Handler, InterfaceManager, Manager, PeerKind, PeerManager, SetSrcManager,
    StoreManager,
};
use crate::templates::{FrrTemplates, Renderer};

#[derive(Debug)]
pub enum DaemonError {
    Config(ConfigError),
    Frr(FrrError),
    /// Event feed couldn't be opened. [path, reason]
    Events(String, String),
    /// Signal handlers couldn't be installed. [reason]
    Signal(String),
    Transport(TransportError),
}

impl DaemonError {
    /// Process exit code: 2 when the daemon never started, 1 when it failed while running
    pub fn exit_code(&self) -> i32 {
        match self {
            DaemonError::Transport(_) => 1,
            _ => 2,
        }
    }
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DaemonError::Config(err) => write!(f, "{}", err),
            DaemonError::Frr(err) => write!(f, "{}", err),
            DaemonError::Events(path, r) => write!(f, "Can't open event feed '{}' [{}]", path, r),
            DaemonError::Signal(r) => write!(f, "Can't install signal handlers [{}]", r),
            DaemonError::Transport(err) => write!(f, "{}", err),
        }
    }
}

impl From<ConfigError> for DaemonError {
    fn from(error: ConfigError) -> Self {
        DaemonError::Config(error)
    }
}

impl From<FrrError> for DaemonError {
    fn from(error: FrrError) -> Self {
        DaemonError::Frr(error)
    }
}

impl From<TransportError> for DaemonError {
    fn from(error: TransportError) -> Self {
        DaemonError::Transport(error)
    }
}

impl error::Error for DaemonError {
    fn description(&self) -> &str {
        "Daemon Error"
    }
}

/// How the daemon is started
#[derive(Debug)]
pub struct Options {
    /// Constants file, built-in defaults when absent
    pub constants: Option<PathBuf>,
    /// Event feed, stdin when absent
    pub events: Option<PathBuf>,
    pub vtysh: PathBuf,
    pub wait_for_daemons: bool,
}

/// Build every manager, in the order their events should be handled
pub fn build_managers(
    directory: &Rc<Directory>,
    frr: &Rc<dyn Frr>,
    renderer: &Rc<dyn Renderer>,
    constants: &Constants,
) -> Result<Vec<Rc<Handler>>, FrrError> {
    let config = |table: &str| Slot::new(Database::Config, table);
    let peer = |table: &str, kind: PeerKind, require_neighbor_metadata: bool| {
        PeerManager::new(
            config(table),
            kind,
            require_neighbor_metadata,
            constants,
            Rc::clone(directory),
            Rc::clone(frr),
            Rc::clone(renderer),
        )
    };

    let mut managers: Vec<Box<dyn Manager>> = Vec::new();
    for table in &["DEVICE_METADATA", "DEVICE_NEIGHBOR_METADATA"] {
        managers.push(Box::new(StoreManager::new(
            config(*table),
            Rc::clone(directory),
        )));
    }
    for table in &[
        "INTERFACE",
        "LOOPBACK_INTERFACE",
        "VLAN_INTERFACE",
        "PORTCHANNEL_INTERFACE",
    ] {
        managers.push(Box::new(InterfaceManager::new(
            config(*table),
            Rc::clone(directory),
        )));
    }
    managers.push(Box::new(SetSrcManager::new(
        Slot::new(Database::State, "INTERFACE_TABLE"),
        Rc::clone(frr),
    )));
    managers.push(Box::new(peer(
        "BGP_NEIGHBOR",
        PeerKind::General,
        constants.use_neighbors_meta,
    )?));
    managers.push(Box::new(peer("BGP_MONITORS", PeerKind::Monitors, false)?));
    managers.push(Box::new(peer("BGP_PEER_RANGE", PeerKind::Dynamic, false)?));
    managers.push(Box::new(AllowListManager::new(
        config("BGP_ALLOWED_PREFIXES"),
        Rc::clone(frr),
    )));

    Ok(managers
        .into_iter()
        .map(|manager| Handler::register(Rc::clone(directory), manager))
        .collect())
}

async fn run<S: EventSource>(
    source: S,
    handlers: Vec<Rc<Handler>>,
    shutdown: Arc<AtomicBool>,
) -> Result<(), DaemonError> {
    let mut dispatcher = Dispatcher::new(source, shutdown);
    for handler in handlers {
        dispatcher.add_manager(handler)?;
    }
    info!("Waiting for events");
    dispatcher.run().await?;
    Ok(())
}

/// Start the daemon and process events until SIGTERM/SIGINT
pub async fn serve(options: Options) -> Result<(), DaemonError> {
    let constants = match &options.constants {
        Some(path) => {
            let constants = Constants::from_file(path)?;
            debug!("Loaded constants from {}", path.display());
            constants
        }
        None => Constants::default(),
    };
    let frr: Rc<dyn Frr> = Rc::new(Vtysh::new(&options.vtysh));
    if options.wait_for_daemons {
        wait_for_daemons(&*frr, &constants.wait_for, constants.wait_timeout).await?;
    }

    let directory = Rc::new(Directory::new());
    let renderer: Rc<dyn Renderer> = Rc::new(FrrTemplates);
    let handlers = build_managers(&directory, &frr, &renderer, &constants)?;
    info!("{} managers started", handlers.len());

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in &[SIGTERM, SIGINT] {
        signal_hook::flag::register(*signal, Arc::clone(&shutdown))
            .map_err(|err| DaemonError::Signal(err.to_string()))?;
    }

    match &options.events {
        Some(path) => {
            let file = tokio::fs::File::open(path).await.map_err(|err| {
                DaemonError::Events(path.display().to_string(), err.to_string())
            })?;
            info!("Reading events from {}", path.display());
            run(JsonLinesSource::new(BufReader::new(file)), handlers, shutdown).await
        }
        None => {
            let stdin = BufReader::new(tokio::io::stdin());
            run(JsonLinesSource::new(stdin), handlers, shutdown).await
        }
    }
}
