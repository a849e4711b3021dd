//! Event log - append-only crash-recovery journal.
//!
//! Every order-mutating request (new order, cancel) is appended as its
//! exact wire record, discriminated by the header type byte, and
//! flushed before the engine runs. Recovery reads the log from the
//! start and pushes each record back through the normal submit/cancel
//! path; a torn record at the tail (crash mid-write) ends iteration
//! cleanly rather than failing replay.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::protocol::{
    Frame, MessageHeader, NewOrderRequest, OrderCancelRequest, ProtocolError, HEADER_LEN,
    MAX_FRAME_LEN,
};

/// Log file name inside the configured log directory.
pub const EVENT_LOG_FILE: &str = "orders.bin";

#[derive(Error, Debug)]
pub enum EventLogError {
    #[error("event log I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported record type 0x{0:02x} in event log")]
    UnsupportedRecord(u8),

    #[error("corrupt record: {0}")]
    Corrupt(#[from] ProtocolError),
}

/// Append-only writer.
pub struct EventLog {
    file: File,
    path: PathBuf,
}

impl EventLog {
    /// Open (creating the directory and file as needed) for appending.
    pub fn open(dir: &Path) -> Result<Self, EventLogError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(EVENT_LOG_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(path = %path.display(), "event log open");
        Ok(Self { file, path })
    }

    /// Append one wire record and flush. Must complete before the
    /// request reaches the engine.
    pub fn append(&mut self, frame: &[u8]) -> Result<(), EventLogError> {
        self.file.write_all(frame)?;
        self.file.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A replayable request recovered from the log.
#[derive(Clone, Copy, Debug)]
pub enum LoggedRequest {
    NewOrder(NewOrderRequest),
    Cancel(OrderCancelRequest),
}

/// Sequential reader over a persisted log.
#[derive(Debug)]
pub struct EventLogReader {
    data: Vec<u8>,
    pos: usize,
}

impl EventLogReader {
    pub fn open(dir: &Path) -> Result<Self, EventLogError> {
        let path = dir.join(EVENT_LOG_FILE);
        let mut data = Vec::new();
        File::open(&path)?.read_to_end(&mut data)?;
        Ok(Self { data, pos: 0 })
    }

    /// Next record, or `None` at end of log. A short read at the tail
    /// stops iteration; a record with an implausible length or a type
    /// that is not order-mutating is corruption.
    pub fn next_record(&mut self) -> Result<Option<LoggedRequest>, EventLogError> {
        let remaining = &self.data[self.pos..];
        if remaining.len() < HEADER_LEN {
            if !remaining.is_empty() {
                warn!(bytes = remaining.len(), "torn record at log tail, stopping");
            }
            return Ok(None);
        }

        let header = MessageHeader::decode(remaining)?;
        let len = header.msg_len as usize;
        if len < HEADER_LEN || len > MAX_FRAME_LEN {
            return Err(EventLogError::Corrupt(ProtocolError::BadLength(
                header.msg_len,
            )));
        }
        if remaining.len() < len {
            warn!(
                need = len,
                have = remaining.len(),
                "torn record at log tail, stopping"
            );
            return Ok(None);
        }

        let frame = Frame::decode(&remaining[..len])?;
        self.pos += len;

        match frame {
            Frame::NewOrder(req) => Ok(Some(LoggedRequest::NewOrder(req))),
            Frame::Cancel(req) => Ok(Some(LoggedRequest::Cancel(req))),
            _ => Err(EventLogError::UnsupportedRecord(header.msg_type)),
        }
    }
}
