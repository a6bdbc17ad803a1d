//! Picks the active data slot from the persisted index digit.

use std::io::{Read, Seek, SeekFrom, Write};

use log::{debug, warn};

use crate::error::LogError;
use crate::layout::{INDEX_FILE_NAME, SLOT_COUNT};
use crate::volume::{LogDirectory, LogFile, OpenMode};

/// Slot that follows the one recorded as `digit`.
///
/// Anything outside `'1'..='8'` (the seed `'0'`, the last slot `'9'`, garbage)
/// restarts the cycle at slot 1.
pub fn next_slot(digit: u8) -> u8 {
    match digit {
        b'1'..=b'8' => digit - b'0' + 1,
        _ => 1,
    }
}

/// Advances the rotation recorded in `index_file` and returns the new slot.
///
/// An unreadable index counts as `'0'`. Failing to persist the new digit is only
/// logged: the slot is still used, and the next boot falls back to slot 1.
pub fn determine_active_slot<F: LogFile>(index_file: &mut F) -> u8 {
    let mut byte = [b'0'];
    let read = index_file
        .seek(SeekFrom::Start(0))
        .and_then(|_| index_file.read(&mut byte));
    match read {
        Ok(1) => {}
        Ok(_) => byte[0] = b'0',
        Err(e) => {
            debug!("failed to read {INDEX_FILE_NAME}, assuming no slot used: {e}");
            byte[0] = b'0';
        }
    }

    let slot = next_slot(byte[0]);
    debug_assert!((1..=SLOT_COUNT).contains(&slot));

    let written = index_file
        .seek(SeekFrom::Start(0))
        .and_then(|_| index_file.write_all(&[b'0' + slot]))
        .and_then(|_| index_file.sync());
    if let Err(e) = written {
        warn!("failed to persist slot {slot} to {INDEX_FILE_NAME}: {e}");
    }
    slot
}

/// Opens the index file in `dir` and advances it. Only a missing or unopenable
/// index file is an error.
pub fn select_slot<D: LogDirectory>(dir: &D) -> Result<u8, LogError> {
    let mut index_file = dir
        .open(INDEX_FILE_NAME, OpenMode::Existing)
        .map_err(|e| LogError::io(INDEX_FILE_NAME, e))?;
    Ok(determine_active_slot(&mut index_file))
}
