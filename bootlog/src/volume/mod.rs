//! Volume capability consumed by the registry and the append engine.
//!
//! A [`Volume`] hands out its log directory on demand; nothing here is held open
//! between two operations. Handles are released by dropping them.

use std::io::{self, Read, Seek, SeekFrom, Write};

pub mod dir;
pub mod memory;

pub use dir::DirVolume;
pub use memory::MemVolume;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read/write an existing file. Fails with `NotFound` when it is absent.
    Existing,
    /// Create the file, discarding any previous content.
    Create,
}

pub trait Volume {
    type Dir: LogDirectory;

    /// Human readable name used in diagnostics.
    fn label(&self) -> &str;

    fn open_log_dir(&self) -> io::Result<Self::Dir>;
}

pub trait LogDirectory {
    type File: LogFile;

    fn open(&self, name: &str, mode: OpenMode) -> io::Result<Self::File>;

    fn delete(&self, name: &str) -> io::Result<()>;
}

pub trait LogFile: Read + Write + Seek {
    /// Length of the file. Leaves the position at the end.
    fn size(&mut self) -> io::Result<u64> {
        self.seek(SeekFrom::End(0))
    }

    /// Pushes buffered data down to the medium.
    fn sync(&mut self) -> io::Result<()> {
        self.flush()
    }
}
