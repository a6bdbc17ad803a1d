//! Fixed on-disk file set.
//!
//! Every log volume carries one index file plus [`SLOT_COUNT`] data files, all in a
//! single directory. The index file is two bytes: an ASCII digit naming the slot that
//! was last made active, then a line feed. Each data file is exactly
//! `data_file_size` bytes, built from `chunk_size` sized chunks of filler.

use crate::error::LayoutError;

/// Storage block size the chunk size has to be aligned to.
pub const BLOCK_SIZE: u64 = 512;
/// Granularity at which data files are built.
pub const CHUNK_SIZE: u64 = 8 * 1024;
/// Size of each rotating data file.
pub const DATA_FILE_SIZE: u64 = 4 * 1024 * 1024;
/// Number of rotating data files. Bounded by the single digit stored in the index.
pub const SLOT_COUNT: u8 = 9;

pub const INDEX_FILE_NAME: &str = "log_index.txt";
pub const INDEX_FILE_SIZE: u64 = 2;
/// Initial index content: no slot has been used yet.
pub const INDEX_SEED: [u8; 2] = *b"0\n";

pub const DEFAULT_LOG_DIR: &str = "boot_logs";

const DATA_FILE_NAMES: [&str; SLOT_COUNT as usize] = [
    "log_1.txt",
    "log_2.txt",
    "log_3.txt",
    "log_4.txt",
    "log_5.txt",
    "log_6.txt",
    "log_7.txt",
    "log_8.txt",
    "log_9.txt",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Index,
    Data(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutEntry {
    pub name: &'static str,
    pub required_size: u64,
    pub kind: FileKind,
}

/// Sizes of the file set, checked so that `data_file_size % chunk_size == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    data_file_size: u64,
    chunk_size: u64,
}

impl Default for Layout {
    fn default() -> Self {
        Layout {
            data_file_size: DATA_FILE_SIZE,
            chunk_size: CHUNK_SIZE,
        }
    }
}

impl Layout {
    pub fn new(data_file_size: u64, chunk_size: u64) -> Result<Self, LayoutError> {
        if chunk_size == 0 || chunk_size % BLOCK_SIZE != 0 {
            return Err(LayoutError::ChunkSize(chunk_size));
        }
        if data_file_size == 0 || data_file_size % chunk_size != 0 {
            return Err(LayoutError::DataFileSize {
                size: data_file_size,
                chunk: chunk_size,
            });
        }
        Ok(Layout {
            data_file_size,
            chunk_size,
        })
    }

    pub fn data_file_size(&self) -> u64 {
        self.data_file_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn chunk_count(&self) -> u64 {
        self.data_file_size / self.chunk_size
    }

    pub fn index_entry(&self) -> LayoutEntry {
        LayoutEntry {
            name: INDEX_FILE_NAME,
            required_size: INDEX_FILE_SIZE,
            kind: FileKind::Index,
        }
    }

    /// Entry for data slot `slot` (1-based). `None` outside `1..=SLOT_COUNT`.
    pub fn slot_entry(&self, slot: u8) -> Option<LayoutEntry> {
        if !(1..=SLOT_COUNT).contains(&slot) {
            return None;
        }
        Some(LayoutEntry {
            name: DATA_FILE_NAMES[usize::from(slot - 1)],
            required_size: self.data_file_size,
            kind: FileKind::Data(slot),
        })
    }

    /// All entries in build order: the index file first, then slots 1..=N.
    pub fn entries(&self) -> impl Iterator<Item = LayoutEntry> + '_ {
        std::iter::once(self.index_entry())
            .chain((1..=SLOT_COUNT).filter_map(move |slot| self.slot_entry(slot)))
    }
}
