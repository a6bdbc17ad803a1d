//! Appends the unwritten tail of the log source to a device's active slot.

use std::io::{self, Seek, SeekFrom, Write};

use log::{debug, error, info, warn};

use crate::device::DeviceRecord;
use crate::error::LogError;
use crate::layout::Layout;
use crate::marker::{Clock, write_eof_marker};
use crate::rotation::select_slot;
use crate::source::LogSource;
use crate::volume::{LogDirectory, LogFile, OpenMode, Volume};

/// What one successful append pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendReport {
    pub slot: u8,
    /// Bytes of real content written in this pass.
    pub bytes: u64,
    /// Bytes consumed from the source but dropped for lack of room.
    pub dropped: u64,
    pub marker_written: bool,
}

impl AppendReport {
    pub fn truncated(&self) -> bool {
        self.dropped > 0
    }
}

/// Appends everything `source` has beyond the device's cursor, up to the file size.
///
/// A disabled device returns [`LogError::DeviceDisabled`] without touching the
/// volume. Any other error invalidates the device for good. File and directory
/// handles never outlive the call.
pub fn append_pending<V, S>(
    device: &mut DeviceRecord<V>,
    source: &S,
    layout: &Layout,
    clock: &dyn Clock,
) -> Result<AppendReport, LogError>
where
    V: Volume,
    S: LogSource + ?Sized,
{
    if !device.valid {
        return Err(LogError::DeviceDisabled);
    }
    match append_to_active_slot(device, source, layout, clock) {
        Ok(report) => Ok(report),
        Err(e) => {
            error!("{}: disabling log device: {e}", device.volume.label());
            device.invalidate();
            Err(e)
        }
    }
}

fn append_to_active_slot<V, S>(
    device: &mut DeviceRecord<V>,
    source: &S,
    layout: &Layout,
    clock: &dyn Clock,
) -> Result<AppendReport, LogError>
where
    V: Volume,
    S: LogSource + ?Sized,
{
    let dir = device
        .volume
        .open_log_dir()
        .map_err(|e| LogError::VolumeUnavailable {
            volume: device.volume.label().to_string(),
            source: e,
        })?;

    let slot = match device.active_slot {
        Some(slot) => slot,
        None => {
            let slot = select_slot(&dir)?;
            info!("{}: logging to slot {slot}", device.volume.label());
            device.active_slot = Some(slot);
            device.write_cursor = 0;
            slot
        }
    };
    let entry = layout.slot_entry(slot).ok_or_else(|| {
        LogError::io(
            "index",
            io::Error::new(io::ErrorKind::InvalidData, format!("slot {slot} out of range")),
        )
    })?;
    let name = entry.name;

    let mut file = dir
        .open(name, OpenMode::Existing)
        .map_err(|e| LogError::io(name, e))?;
    file.seek(SeekFrom::Start(device.write_cursor))
        .map_err(|e| LogError::io(name, e))?;

    let mut room_left = layout.data_file_size().saturating_sub(device.write_cursor);
    let mut report = AppendReport {
        slot,
        bytes: 0,
        dropped: 0,
        marker_written: false,
    };

    while let Some(line) = source.next_line(device.source_cursor)? {
        let len = line.bytes.len() as u64;
        let write_len = len.min(room_left);
        report.dropped += len - write_len;
        if write_len > 0 {
            // write_len <= line.bytes.len(), so it fits in usize
            let chunk = &line.bytes[..write_len as usize];
            file.write_all(chunk)
                .map_err(|e| LogError::write(name, chunk.len(), e))?;
            device.write_cursor += write_len;
            device.bytes_written += write_len;
            room_left -= write_len;
            report.bytes += write_len;
        }
        // partial lines are not retried on the next pass
        device.source_cursor = line.next;
    }

    if report.truncated() {
        device.truncations += 1;
        if device.truncations == 1 {
            warn!(
                "{}: {name} is full, dropped {} bytes of log",
                device.volume.label(),
                report.dropped
            );
        } else {
            debug!(
                "{}: {name} still full, dropped {} more bytes",
                device.volume.label(),
                report.dropped
            );
        }
    }

    match write_eof_marker(&mut file, name, room_left, clock) {
        Ok(()) => report.marker_written = room_left > 0,
        Err(e) => warn!("{}: failed to write end marker: {e}", device.volume.label()),
    }
    file.sync().map_err(|e| LogError::io(name, e))?;

    debug!(
        "{}: appended {} bytes to {name}, cursor at {}",
        device.volume.label(),
        report.bytes,
        device.write_cursor
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::validate_or_rebuild;
    use crate::layout::INDEX_FILE_NAME;
    use crate::marker::{FixedClock, banner};
    use crate::source::{MemoryLog, SourceCursor};
    use crate::volume::MemVolume;

    const CLOCK: FixedClock = FixedClock(None);

    fn layout() -> Layout {
        Layout::new(1024, 512).unwrap()
    }

    fn prepared_device() -> (MemVolume, DeviceRecord<MemVolume>) {
        let volume = MemVolume::new("mem0");
        let dir = volume.open_log_dir().unwrap();
        let layout = layout();
        for entry in layout.entries() {
            validate_or_rebuild(&dir, &entry, &layout, &CLOCK).unwrap();
        }
        (volume.clone(), DeviceRecord::new(volume))
    }

    #[test]
    fn test_first_append_selects_slot_and_writes_from_start() {
        let (volume, mut device) = prepared_device();
        let mut log = MemoryLog::default();
        log.push_raw(b"hello\nworld\n");

        let report = append_pending(&mut device, &log, &layout(), &CLOCK).unwrap();
        assert_eq!(report.slot, 1);
        assert_eq!(report.bytes, 12);
        assert!(report.marker_written);
        assert_eq!(device.active_slot(), Some(1));
        assert_eq!(device.write_cursor(), 12);
        assert_eq!(device.source_cursor(), SourceCursor::new(12));
        assert_eq!(volume.file(INDEX_FILE_NAME).unwrap(), b"1\n");

        let data = volume.file("log_1.txt").unwrap();
        assert_eq!(data.len(), 1024);
        let marker = banner(&CLOCK);
        assert_eq!(&data[..12], b"hello\nworld\n");
        assert_eq!(&data[12..12 + marker.len()], marker.as_bytes());
        assert_eq!(volume.open_handles(), 0);
    }

    #[test]
    fn test_only_new_lines_are_appended() {
        let (volume, mut device) = prepared_device();
        let mut log = MemoryLog::default();
        log.push_raw(b"a\n");
        append_pending(&mut device, &log, &layout(), &CLOCK).unwrap();
        log.push_raw(b"b\n");
        let report = append_pending(&mut device, &log, &layout(), &CLOCK).unwrap();
        assert_eq!(report.bytes, 2);
        assert_eq!(device.write_cursor(), 4);
        assert_eq!(&volume.file("log_1.txt").unwrap()[..4], b"a\nb\n");
        // slot is chosen once per registration
        assert_eq!(volume.file(INDEX_FILE_NAME).unwrap(), b"1\n");
    }

    #[test]
    fn test_no_new_data_keeps_cursor() {
        let (_volume, mut device) = prepared_device();
        let mut log = MemoryLog::default();
        log.push_raw(b"abc\n");
        append_pending(&mut device, &log, &layout(), &CLOCK).unwrap();
        let cursor = device.write_cursor();
        let report = append_pending(&mut device, &log, &layout(), &CLOCK).unwrap();
        assert_eq!(report.bytes, 0);
        assert_eq!(device.write_cursor(), cursor);
        let report = append_pending(&mut device, &log, &layout(), &CLOCK).unwrap();
        assert_eq!(report.bytes, 0);
        assert_eq!(device.write_cursor(), cursor);
    }

    #[test]
    fn test_truncates_at_file_size() {
        let (volume, mut device) = prepared_device();
        let mut log = MemoryLog::default();
        log.push_raw(&[b'a'; 1000]);
        log.push_raw(&[b'b'; 99]);

        let report = append_pending(&mut device, &log, &layout(), &CLOCK).unwrap();
        // 1001 + 100 bytes offered, 1024 fit
        assert_eq!(report.bytes, 1024);
        assert_eq!(report.dropped, 77);
        assert!(!report.marker_written);
        assert_eq!(device.write_cursor(), 1024);
        assert!(device.is_valid());
        assert_eq!(device.source_cursor().position(), log.len() as u64);

        let data = volume.file("log_1.txt").unwrap();
        assert_eq!(data.len(), 1024);
        assert_eq!(data[1023], b'b');

        assert_eq!(device.truncations(), 1);

        log.push_raw(b"late\n");
        log.push_raw(b"later\n");
        let report = append_pending(&mut device, &log, &layout(), &CLOCK).unwrap();
        assert_eq!(report.bytes, 0);
        assert_eq!(report.dropped, 11);
        assert_eq!(volume.file("log_1.txt").unwrap(), data);
        // one event per pass, however many lines it dropped
        assert_eq!(device.truncations(), 2);

        append_pending(&mut device, &log, &layout(), &CLOCK).unwrap();
        assert_eq!(device.truncations(), 2);
    }

    #[test]
    fn test_unavailable_volume_invalidates() {
        let (volume, mut device) = prepared_device();
        volume.set_unavailable(true);
        let log = MemoryLog::default();
        let err = append_pending(&mut device, &log, &layout(), &CLOCK).unwrap_err();
        assert!(matches!(err, LogError::VolumeUnavailable { .. }));
        assert!(!device.is_valid());

        volume.set_unavailable(false);
        let err = append_pending(&mut device, &log, &layout(), &CLOCK).unwrap_err();
        assert!(matches!(err, LogError::DeviceDisabled));
    }

    #[test]
    fn test_missing_slot_file_invalidates() {
        let (volume, mut device) = prepared_device();
        let dir = volume.open_log_dir().unwrap();
        dir.delete("log_1.txt").unwrap();
        let err = append_pending(&mut device, &MemoryLog::default(), &layout(), &CLOCK)
            .unwrap_err();
        assert!(matches!(err, LogError::Io { .. }));
        assert!(!device.is_valid());
        assert_eq!(volume.open_handles(), 0);
    }

    #[test]
    fn test_write_failure_invalidates_and_releases_handles() {
        let (volume, mut device) = prepared_device();
        volume.fail_writes_after("log_1.txt", 3);
        let mut log = MemoryLog::default();
        log.push_raw(b"abcdef\n");
        let err = append_pending(&mut device, &log, &layout(), &CLOCK).unwrap_err();
        assert!(matches!(err, LogError::Io { .. }));
        assert!(!device.is_valid());
        assert_eq!(volume.open_handles(), 0);
    }

    #[test]
    fn test_marker_failure_keeps_device_valid() {
        let (volume, mut device) = prepared_device();
        let mut log = MemoryLog::default();
        log.push_raw(b"abc\n");
        volume.fail_writes_after("log_1.txt", 4);
        let report = append_pending(&mut device, &log, &layout(), &CLOCK).unwrap();
        assert_eq!(report.bytes, 4);
        assert!(!report.marker_written);
        assert!(device.is_valid());
    }
}
