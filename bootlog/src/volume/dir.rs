//! Volume backed by a host directory.

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use super::{LogDirectory, LogFile, OpenMode, Volume};
use crate::layout::DEFAULT_LOG_DIR;

pub struct DirVolume {
    root: PathBuf,
    log_dir: String,
    label: String,
}

impl DirVolume {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self::with_log_dir(root, DEFAULT_LOG_DIR)
    }

    pub fn with_log_dir<P: AsRef<Path>>(root: P, log_dir: impl Into<String>) -> Self {
        let root = root.as_ref().to_path_buf();
        let label = root.display().to_string();
        DirVolume {
            root,
            log_dir: log_dir.into(),
            label,
        }
    }

    pub fn log_dir_path(&self) -> PathBuf {
        self.root.join(&self.log_dir)
    }
}

impl Volume for DirVolume {
    type Dir = DirLogDirectory;

    fn label(&self) -> &str {
        &self.label
    }

    fn open_log_dir(&self) -> io::Result<DirLogDirectory> {
        if !self.root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", self.root.display()),
            ));
        }
        let path = self.log_dir_path();
        DirBuilder::new().recursive(true).create(&path)?;
        Ok(DirLogDirectory { path })
    }
}

pub struct DirLogDirectory {
    path: PathBuf,
}

impl DirLogDirectory {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        DirLogDirectory {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl LogDirectory for DirLogDirectory {
    type File = File;

    fn open(&self, name: &str, mode: OpenMode) -> io::Result<File> {
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        if mode == OpenMode::Create {
            options.create(true).truncate(true);
        }
        options.open(self.path.join(name))
    }

    fn delete(&self, name: &str) -> io::Result<()> {
        fs::remove_file(self.path.join(name))
    }
}

impl LogFile for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}
