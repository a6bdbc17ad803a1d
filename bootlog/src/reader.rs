//! Read-back of a persisted file set, for operators inspecting a volume.

use std::io::{self, Read};

use crate::error::LogError;
use crate::layout::{INDEX_FILE_NAME, Layout};
use crate::marker::{BANNER_DELIMITER, BANNER_TITLE};
use crate::volume::{LogDirectory, LogFile, OpenMode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    pub name: &'static str,
    /// `None` when the file does not exist.
    pub size: Option<u64>,
    pub expected: u64,
}

impl FileStatus {
    pub fn is_valid(&self) -> bool {
        self.size == Some(self.expected)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeReport {
    /// Slot recorded in the index file, `Some(0)` for a fresh seed.
    pub last_slot: Option<u8>,
    pub files: Vec<FileStatus>,
}

impl VolumeReport {
    pub fn is_complete(&self) -> bool {
        self.files.iter().all(FileStatus::is_valid)
    }
}

fn read_all<D: LogDirectory>(dir: &D, name: &str) -> Result<Option<Vec<u8>>, LogError> {
    let mut file = match dir.open(name, OpenMode::Existing) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(LogError::io(name, e)),
    };
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .map_err(|e| LogError::io(name, e))?;
    Ok(Some(buf))
}

/// Slot recorded in the index file, if the file holds a digit.
pub fn last_slot<D: LogDirectory>(dir: &D) -> Result<Option<u8>, LogError> {
    Ok(read_all(dir, INDEX_FILE_NAME)?
        .and_then(|data| data.first().copied())
        .filter(u8::is_ascii_digit)
        .map(|digit| digit - b'0'))
}

pub fn inspect<D: LogDirectory>(dir: &D, layout: &Layout) -> Result<VolumeReport, LogError> {
    let mut files = Vec::new();
    for entry in layout.entries() {
        let size = match dir.open(entry.name, OpenMode::Existing) {
            Ok(mut file) => Some(file.size().map_err(|e| LogError::io(entry.name, e))?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(LogError::io(entry.name, e)),
        };
        files.push(FileStatus {
            name: entry.name,
            size,
            expected: entry.required_size,
        });
    }
    Ok(VolumeReport {
        last_slot: last_slot(dir)?,
        files,
    })
}

/// Real log content of `slot`: everything before the first end banner. A file
/// filled to the brim has no banner and is returned whole.
pub fn read_slot<D: LogDirectory>(
    dir: &D,
    layout: &Layout,
    slot: u8,
) -> Result<Option<Vec<u8>>, LogError> {
    let Some(entry) = layout.slot_entry(slot) else {
        return Ok(None);
    };
    let Some(mut data) = read_all(dir, entry.name)? else {
        return Ok(None);
    };
    let opening = format!("\n{BANNER_DELIMITER} {BANNER_TITLE} ");
    if let Some(end) = data
        .windows(opening.len())
        .position(|w| w == opening.as_bytes())
    {
        data.truncate(end);
    }
    Ok(Some(data))
}
