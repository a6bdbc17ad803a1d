//! In-memory volume for local development and tests.
//!
//! Clones share the same files, so a test can keep one handle for inspection and
//! hand another to the engine. Faults can be injected per file.

use std::collections::{BTreeMap, HashMap};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{LogDirectory, LogFile, OpenMode, Volume};

#[derive(Default)]
struct MemState {
    files: BTreeMap<String, Vec<u8>>,
    unavailable: bool,
    fail_deletes: bool,
    // bytes each file may still accept before writes start failing
    write_budget: HashMap<String, usize>,
    open_handles: usize,
}

#[derive(Clone)]
pub struct MemVolume {
    label: String,
    state: Arc<Mutex<MemState>>,
}

impl MemVolume {
    pub fn new(label: impl Into<String>) -> Self {
        MemVolume {
            label: label.into(),
            state: Arc::new(Mutex::new(MemState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemState> {
        lock(&self.state)
    }

    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        self.state().files.get(name).cloned()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.state().files.keys().cloned().collect()
    }

    pub fn set_file(&self, name: &str, content: impl Into<Vec<u8>>) {
        self.state().files.insert(name.to_string(), content.into());
    }

    /// Makes [`Volume::open_log_dir`] fail, as if the volume was pulled.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.state().fail_deletes = fail;
    }

    /// Lets `name` accept `bytes` more bytes, then fails every write to it.
    pub fn fail_writes_after(&self, name: &str, bytes: usize) {
        self.state().write_budget.insert(name.to_string(), bytes);
    }

    pub fn clear_faults(&self) {
        let mut state = self.state();
        state.unavailable = false;
        state.fail_deletes = false;
        state.write_budget.clear();
    }

    /// Number of file handles currently open on this volume.
    pub fn open_handles(&self) -> usize {
        self.state().open_handles
    }
}

fn lock(state: &Mutex<MemState>) -> MutexGuard<'_, MemState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Volume for MemVolume {
    type Dir = MemDirectory;

    fn label(&self) -> &str {
        &self.label
    }

    fn open_log_dir(&self) -> io::Result<MemDirectory> {
        if self.state().unavailable {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("volume {} is not present", self.label),
            ));
        }
        Ok(MemDirectory {
            state: Arc::clone(&self.state),
        })
    }
}

pub struct MemDirectory {
    state: Arc<Mutex<MemState>>,
}

impl LogDirectory for MemDirectory {
    type File = MemFile;

    fn open(&self, name: &str, mode: OpenMode) -> io::Result<MemFile> {
        let mut state = lock(&self.state);
        match mode {
            OpenMode::Existing if !state.files.contains_key(name) => {
                return Err(io::Error::new(io::ErrorKind::NotFound, name.to_string()));
            }
            OpenMode::Existing => {}
            OpenMode::Create => {
                state.files.insert(name.to_string(), Vec::new());
            }
        }
        state.open_handles += 1;
        Ok(MemFile {
            state: Arc::clone(&self.state),
            name: name.to_string(),
            pos: 0,
        })
    }

    fn delete(&self, name: &str) -> io::Result<()> {
        let mut state = lock(&self.state);
        if state.fail_deletes {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("delete of {name} refused"),
            ));
        }
        state
            .files
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))
    }
}

pub struct MemFile {
    state: Arc<Mutex<MemState>>,
    name: String,
    pos: u64,
}

impl Read for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let state = lock(&self.state);
        let data = state
            .files
            .get(&self.name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, self.name.clone()))?;
        let start = usize::try_from(self.pos).unwrap_or(usize::MAX).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for MemFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = lock(&self.state);
        let mut len = buf.len();
        if let Some(budget) = state.write_budget.get_mut(&self.name) {
            if *budget == 0 && len > 0 {
                return Err(io::Error::other(format!(
                    "injected write failure on {}",
                    self.name
                )));
            }
            len = len.min(*budget);
            *budget -= len;
        }
        let data = state
            .files
            .get_mut(&self.name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, self.name.clone()))?;
        let start = usize::try_from(self.pos)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset overflow"))?;
        let end = start + len;
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(&buf[..len]);
        self.pos = end as u64;
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = {
            let state = lock(&self.state);
            state.files.get(&self.name).map_or(0, |d| d.len() as u64)
        };
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of file")
        })?;
        self.pos = target;
        Ok(target)
    }
}

impl LogFile for MemFile {}

impl Drop for MemFile {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.open_handles = state.open_handles.saturating_sub(1);
    }
}
