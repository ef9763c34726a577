//! Keeps the running FRR BGP configuration in sync with the tables of a
//! configuration database.
//!
//! Table row events are read from an [`EventSource`](dispatcher::EventSource)
//! and handed to per-table [managers](managers), which cache what they see in
//! the [`Directory`](directory::Directory) and push FRR configuration once
//! everything a change depends on is known.
pub mod config;
mod daemon;
pub mod directory;
pub mod dispatcher;
pub mod frr;
pub mod managers;
pub mod templates;
pub mod utils;

pub use daemon::{build_managers, serve, DaemonError, Options};
