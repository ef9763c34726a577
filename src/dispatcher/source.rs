use std::collections::HashSet;

use async_trait::async_trait;
use log::{info, trace};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

use super::{Event, EventSource, Operation, TransportError};
use crate::directory::{Database, Row, Slot};

/// One line of the event feed
/// E.g. {"db": "CONFIG_DB", "table": "BGP_NEIGHBOR", "key": "10.0.0.2", "op": "SET", "fields": {"asn": "65200"}}
#[derive(Debug, Deserialize)]
struct EventLine {
    db: String,
    table: String,
    key: String,
    op: String,
    #[serde(default = "Row::new")]
    fields: Row,
}

impl EventLine {
    fn into_event(self) -> Result<Event, TransportError> {
        let db = self
            .db
            .parse::<Database>()
            .map_err(|err| TransportError::Malformed(err.reason))?;
        Ok(Event {
            slot: Slot::new(db, &self.table),
            key: self.key,
            op: Operation::from(self.op.as_str()),
            row: self.fields,
        })
    }
}

/// Reads newline-delimited JSON events from a file or stdin
pub struct JsonLinesSource<R> {
    lines: Lines<R>,
    subscribed: HashSet<Slot>,
    closed: bool,
}

impl<R: AsyncBufRead + Unpin> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            subscribed: HashSet::new(),
            closed: false,
        }
    }
}

pub(super) fn parse_line(line: &str) -> Result<Event, TransportError> {
    serde_json::from_str::<EventLine>(line)
        .map_err(|err| TransportError::Malformed(format!("{} '{}'", err, line)))?
        .into_event()
}

#[async_trait(?Send)]
impl<R: AsyncBufRead + Unpin> EventSource for JsonLinesSource<R> {
    fn subscribe(&mut self, slot: &Slot) -> Result<(), TransportError> {
        self.subscribed.insert(slot.clone());
        Ok(())
    }

    async fn wait(&mut self) -> Result<Vec<Event>, TransportError> {
        if self.closed {
            // Nothing more will arrive; keep idling until shutdown
            return std::future::pending().await;
        }
        loop {
            match self.lines.next_line().await? {
                None => {
                    info!("Event feed closed");
                    self.closed = true;
                    return Ok(vec![]);
                }
                Some(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let event = parse_line(&line)?;
                    if self.subscribed.contains(&event.slot) {
                        return Ok(vec![event]);
                    }
                    trace!("Dropping event for unsubscribed {}", event.slot);
                }
            }
        }
    }
}
