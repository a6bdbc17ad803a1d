//! Validates a layout file, or deletes and rebuilds it.

use std::io::{self, Seek, SeekFrom, Write};

use log::{info, warn};

use crate::error::LogError;
use crate::layout::{FileKind, INDEX_SEED, Layout, LayoutEntry};
use crate::marker::{Clock, write_eof_marker};
use crate::volume::{LogDirectory, LogFile, OpenMode};

/// Filler line length including its line feed. Divides every valid chunk size.
pub const FILLER_LINE_WIDTH: usize = 64;

/// One chunk of filler: spaces, with a line feed closing every line.
pub fn filler_chunk(chunk_size: usize) -> Vec<u8> {
    let mut chunk = vec![b' '; chunk_size];
    for line_end in chunk.iter_mut().skip(FILLER_LINE_WIDTH - 1).step_by(FILLER_LINE_WIDTH) {
        *line_end = b'\n';
    }
    chunk
}

/// Makes sure `entry` exists in `dir` with exactly its required size.
///
/// A file of the wrong size is deleted and built again. Only failures that remain
/// after a rebuild attempt are returned.
pub fn validate_or_rebuild<D: LogDirectory>(
    dir: &D,
    entry: &LayoutEntry,
    layout: &Layout,
    clock: &dyn Clock,
) -> Result<(), LogError> {
    match dir.open(entry.name, OpenMode::Existing) {
        Ok(mut file) => {
            let actual = file.size().map_err(|e| LogError::io(entry.name, e))?;
            if actual == entry.required_size {
                return file.sync().map_err(|e| LogError::io(entry.name, e));
            }
            let mismatch = LogError::LayoutMismatch {
                name: entry.name.to_string(),
                actual,
                expected: entry.required_size,
            };
            warn!("{mismatch}, rebuilding");
            drop(file);
            match dir.delete(entry.name) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(LogError::io(entry.name, e)),
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("{} not found, creating", entry.name);
        }
        Err(e) => return Err(LogError::io(entry.name, e)),
    }
    create(dir, entry, layout, clock)
}

fn create<D: LogDirectory>(
    dir: &D,
    entry: &LayoutEntry,
    layout: &Layout,
    clock: &dyn Clock,
) -> Result<(), LogError> {
    let name = entry.name;
    let mut file = dir
        .open(name, OpenMode::Create)
        .map_err(|e| LogError::io(name, e))?;
    match entry.kind {
        FileKind::Index => file
            .write_all(&INDEX_SEED)
            .map_err(|e| LogError::write(name, INDEX_SEED.len(), e))?,
        FileKind::Data(_) => build_data_file(&mut file, entry, layout, clock)?,
    }
    file.sync().map_err(|e| LogError::io(name, e))
}

fn build_data_file<F: LogFile>(
    file: &mut F,
    entry: &LayoutEntry,
    layout: &Layout,
    clock: &dyn Clock,
) -> Result<(), LogError> {
    let name = entry.name;
    let chunk_size = usize::try_from(layout.chunk_size())
        .map_err(|e| LogError::io(name, io::Error::new(io::ErrorKind::InvalidInput, e)))?;
    let chunk = filler_chunk(chunk_size);
    for _ in 0..layout.chunk_count() {
        file.write_all(&chunk)
            .map_err(|e| LogError::write(name, chunk.len(), e))?;
    }

    let actual = file.size().map_err(|e| LogError::io(name, e))?;
    if actual != entry.required_size {
        return Err(LogError::LayoutMismatch {
            name: name.to_string(),
            actual,
            expected: entry.required_size,
        });
    }

    // nothing appended yet: the whole file is room for the banner
    file.seek(SeekFrom::Start(0))
        .map_err(|e| LogError::io(name, e))?;
    write_eof_marker(file, name, entry.required_size, clock)?;
    file.seek(SeekFrom::End(0))
        .map_err(|e| LogError::io(name, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::INDEX_FILE_NAME;
    use crate::marker::{FixedClock, banner};
    use crate::volume::{MemVolume, Volume};

    fn small_layout() -> Layout {
        Layout::new(4096, 1024).unwrap()
    }

    #[test]
    fn test_filler_lines_stay_short() {
        let chunk = filler_chunk(1024);
        assert_eq!(chunk.len(), 1024);
        for line in chunk.split_inclusive(|b| *b == b'\n') {
            assert_eq!(line.len(), FILLER_LINE_WIDTH);
            assert!(line[..FILLER_LINE_WIDTH - 1].iter().all(|b| *b == b' '));
        }
    }

    #[test]
    fn test_builds_fresh_data_file() {
        let volume = MemVolume::new("mem0");
        let dir = volume.open_log_dir().unwrap();
        let layout = small_layout();
        let entry = layout.slot_entry(1).unwrap();
        let clock = FixedClock(None);

        validate_or_rebuild(&dir, &entry, &layout, &clock).unwrap();

        let data = volume.file("log_1.txt").unwrap();
        assert_eq!(data.len() as u64, layout.data_file_size());
        let marker = banner(&clock);
        assert!(data.starts_with(marker.as_bytes()));
        assert_eq!(&data[marker.len()..FILLER_LINE_WIDTH], &filler_chunk(1024)[marker.len()..FILLER_LINE_WIDTH]);
        assert_eq!(volume.open_handles(), 0);
    }

    #[test]
    fn test_builds_index_seed() {
        let volume = MemVolume::new("mem0");
        let dir = volume.open_log_dir().unwrap();
        let layout = small_layout();
        validate_or_rebuild(&dir, &layout.index_entry(), &layout, &FixedClock(None)).unwrap();
        assert_eq!(volume.file(INDEX_FILE_NAME).unwrap(), b"0\n");
    }

    #[test]
    fn test_keeps_valid_file_untouched() {
        let volume = MemVolume::new("mem0");
        let layout = small_layout();
        let content = vec![b'x'; 4096];
        volume.set_file("log_2.txt", content.clone());
        let dir = volume.open_log_dir().unwrap();
        validate_or_rebuild(&dir, &layout.slot_entry(2).unwrap(), &layout, &FixedClock(None))
            .unwrap();
        assert_eq!(volume.file("log_2.txt").unwrap(), content);
    }

    #[test]
    fn test_rebuilds_short_file() {
        let volume = MemVolume::new("mem0");
        let layout = small_layout();
        volume.set_file("log_3.txt", vec![b'x'; 4095]);
        let dir = volume.open_log_dir().unwrap();
        validate_or_rebuild(&dir, &layout.slot_entry(3).unwrap(), &layout, &FixedClock(None))
            .unwrap();
        let data = volume.file("log_3.txt").unwrap();
        assert_eq!(data.len(), 4096);
        assert!(!data.contains(&b'x'));
    }

    #[test]
    fn test_rebuild_fails_when_delete_refused() {
        let volume = MemVolume::new("mem0");
        let layout = small_layout();
        volume.set_file(INDEX_FILE_NAME, b"0\n\n".to_vec());
        volume.set_fail_deletes(true);
        let dir = volume.open_log_dir().unwrap();
        let err = validate_or_rebuild(&dir, &layout.index_entry(), &layout, &FixedClock(None))
            .unwrap_err();
        assert!(matches!(err, LogError::Io { .. }));
    }

    #[test]
    fn test_write_failure_is_reported() {
        let volume = MemVolume::new("mem0");
        let layout = small_layout();
        volume.fail_writes_after("log_4.txt", 2000);
        let dir = volume.open_log_dir().unwrap();
        let err = validate_or_rebuild(&dir, &layout.slot_entry(4).unwrap(), &layout, &FixedClock(None))
            .unwrap_err();
        assert!(matches!(err, LogError::Io { .. }));
        assert_eq!(volume.open_handles(), 0);
    }
}
