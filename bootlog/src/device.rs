use std::fmt;

use crate::source::SourceCursor;
use crate::volume::Volume;

/// Stable handle to a registered device, handed out in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub(crate) usize);

impl DeviceId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

/// Per-volume persistence state.
///
/// `valid` only ever goes from true to false. `write_cursor` only moves forward
/// while `active_slot` stays the same.
pub struct DeviceRecord<V> {
    pub(crate) volume: V,
    pub(crate) valid: bool,
    pub(crate) active_slot: Option<u8>,
    pub(crate) write_cursor: u64,
    pub(crate) source_cursor: SourceCursor,
    pub(crate) bytes_written: u64,
    pub(crate) truncations: u64,
}

impl<V: Volume> DeviceRecord<V> {
    pub fn new(volume: V) -> Self {
        DeviceRecord {
            volume,
            valid: true,
            active_slot: None,
            write_cursor: 0,
            source_cursor: SourceCursor::START,
            bytes_written: 0,
            truncations: 0,
        }
    }

    pub fn volume(&self) -> &V {
        &self.volume
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn active_slot(&self) -> Option<u8> {
        self.active_slot
    }

    pub fn write_cursor(&self) -> u64 {
        self.write_cursor
    }

    pub fn source_cursor(&self) -> SourceCursor {
        self.source_cursor
    }

    /// Append passes that had to drop log content for lack of room.
    pub fn truncations(&self) -> u64 {
        self.truncations
    }

    pub(crate) fn invalidate(&mut self) {
        self.valid = false;
    }

    pub fn status(&self, id: DeviceId) -> DeviceStatus {
        DeviceStatus {
            id,
            label: self.volume.label().to_string(),
            valid: self.valid,
            active_slot: self.active_slot,
            write_cursor: self.write_cursor,
            bytes_written: self.bytes_written,
            truncations: self.truncations,
        }
    }
}

/// Snapshot of a device, detached from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    pub id: DeviceId,
    pub label: String,
    pub valid: bool,
    pub active_slot: Option<u8>,
    pub write_cursor: u64,
    pub bytes_written: u64,
    pub truncations: u64,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): ", self.id, self.label)?;
        if !self.valid {
            return write!(f, "invalid");
        }
        match self.active_slot {
            Some(slot) => write!(
                f,
                "slot {slot}, cursor {}, {} bytes written, {} truncations",
                self.write_cursor, self.bytes_written, self.truncations
            ),
            None => write!(f, "no slot selected yet"),
        }
    }
}
