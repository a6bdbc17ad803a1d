//! Device registry and flush coordination.
//!
//! [`LogEngine`] owns every registered device and is the single entry point for
//! the external triggers: volume arrival maps to [`LogEngine::register`], every
//! flush signal to one [`LogEngine::flush_all`].

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use log::{debug, info, warn};

use crate::append::{AppendReport, append_pending};
use crate::builder::validate_or_rebuild;
use crate::device::{DeviceId, DeviceRecord, DeviceStatus};
use crate::error::LogError;
use crate::layout::Layout;
use crate::marker::{Clock, SystemClock};
use crate::source::LogSource;
use crate::volume::Volume;

/// Held while a flush pass runs. Dropping it, also during unwinding, lets the next
/// flush in.
pub struct FlushGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FlushGuard<'a> {
    pub fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlushGuard { flag })
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Periodic,
    ShutdownImminent,
    ResetImminent,
    Explicit,
    VolumeArrival,
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlushTrigger::Periodic => "periodic",
            FlushTrigger::ShutdownImminent => "shutdown",
            FlushTrigger::ResetImminent => "reset",
            FlushTrigger::Explicit => "explicit",
            FlushTrigger::VolumeArrival => "volume arrival",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum FlushOutcome {
    /// Another flush was already running; nothing was touched.
    Rejected,
    /// One entry per registered device, in registration order.
    Completed(Vec<(DeviceId, Result<AppendReport, LogError>)>),
}

impl FlushOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, FlushOutcome::Rejected)
    }

    pub fn results(&self) -> &[(DeviceId, Result<AppendReport, LogError>)] {
        match self {
            FlushOutcome::Rejected => &[],
            FlushOutcome::Completed(results) => results,
        }
    }
}

type Registry<V> = Vec<(DeviceId, DeviceRecord<V>)>;

pub struct LogEngine<V> {
    devices: Mutex<Registry<V>>,
    /// Devices registered while a flush pass held `devices`.
    pending: Mutex<Registry<V>>,
    registered: AtomicUsize,
    flushing: AtomicBool,
    layout: Layout,
    clock: Box<dyn Clock>,
}

impl<V: Volume> LogEngine<V> {
    pub fn new(layout: Layout) -> Self {
        Self::with_clock(layout, SystemClock)
    }

    pub fn with_clock(layout: Layout, clock: impl Clock + 'static) -> Self {
        LogEngine {
            devices: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            registered: AtomicUsize::new(0),
            flushing: AtomicBool::new(false),
            layout,
            clock: Box::new(clock),
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    fn lock_devices(&self) -> MutexGuard<'_, Registry<V>> {
        // a panicking flush leaves the records consistent enough to keep going
        let mut devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        devices.append(&mut self.lock_pending());
        devices
    }

    fn lock_pending(&self) -> MutexGuard<'_, Registry<V>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registry access that never waits on a running flush pass. `None` while a
    /// pass holds the registry, which is always the case for callbacks made from
    /// inside that pass.
    fn try_lock_devices(&self) -> Option<MutexGuard<'_, Registry<V>>> {
        let mut devices = match self.devices.try_lock() {
            Ok(devices) => devices,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
            Err(TryLockError::WouldBlock) if self.is_flushing() => return None,
            Err(TryLockError::WouldBlock) => return Some(self.lock_devices()),
        };
        devices.append(&mut self.lock_pending());
        Some(devices)
    }

    /// Builds or repairs the file set on `volume` and adds it to the registry.
    ///
    /// The first file that cannot be validated or rebuilt rejects the volume. Files
    /// created before that point stay on disk. Slot selection is left to the first
    /// flush. A volume registered while a flush is running joins from the next
    /// flush on.
    pub fn register(&self, volume: V) -> Result<DeviceId, LogError> {
        let dir = volume
            .open_log_dir()
            .map_err(|e| LogError::VolumeUnavailable {
                volume: volume.label().to_string(),
                source: e,
            })?;
        for entry in self.layout.entries() {
            validate_or_rebuild(&dir, &entry, &self.layout, self.clock.as_ref())?;
        }
        drop(dir);

        let id = DeviceId(self.registered.fetch_add(1, Ordering::AcqRel));
        info!("{id}: registered {} as log device", volume.label());
        let record = (id, DeviceRecord::new(volume));
        match self.try_lock_devices() {
            Some(mut devices) => devices.push(record),
            None => {
                debug!("{id}: flush in progress, device queued");
                self.lock_pending().push(record);
            }
        }
        Ok(id)
    }

    /// Volume arrival event. A rejected volume is logged and forgotten.
    pub fn on_volume_arrival(&self, volume: V) -> Option<DeviceId> {
        let label = volume.label().to_string();
        match self.register(volume) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("{label} cannot hold the boot log: {e}");
                None
            }
        }
    }

    /// Appends pending log content to every registered device, in registration
    /// order. Returns [`FlushOutcome::Rejected`] at once if a flush is already
    /// running. Per-device failures disable that device only.
    pub fn flush_all<S: LogSource + ?Sized>(&self, source: &S) -> FlushOutcome {
        let Some(_guard) = FlushGuard::try_acquire(&self.flushing) else {
            debug!("flush already in progress, request dropped");
            return FlushOutcome::Rejected;
        };

        let mut devices = self.lock_devices();
        let results = devices
            .iter_mut()
            .map(|(id, device)| {
                let result = append_pending(device, source, &self.layout, self.clock.as_ref());
                (*id, result)
            })
            .collect();
        devices.append(&mut self.lock_pending());
        FlushOutcome::Completed(results)
    }

    pub fn on_flush_trigger<S: LogSource + ?Sized>(
        &self,
        trigger: FlushTrigger,
        source: &S,
    ) -> FlushOutcome {
        debug!("{trigger} flush requested");
        self.flush_all(source)
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::Acquire)
    }

    /// Number of devices registered so far, including disabled ones.
    pub fn len(&self) -> usize {
        self.registered.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Status of device `id`. `None` for an unknown id, or while a flush pass holds
    /// the registry.
    pub fn device(&self, id: DeviceId) -> Option<DeviceStatus> {
        self.try_lock_devices()?
            .iter()
            .find(|(device_id, _)| *device_id == id)
            .map(|(id, d)| d.status(*id))
    }

    /// Every device in registration order; empty while a flush pass holds the
    /// registry.
    pub fn devices(&self) -> Vec<DeviceStatus> {
        self.try_lock_devices()
            .map(|devices| devices.iter().map(|(id, d)| d.status(*id)).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_is_exclusive_and_scoped() {
        let flag = AtomicBool::new(false);
        let guard = FlushGuard::try_acquire(&flag).expect("first acquire");
        assert!(FlushGuard::try_acquire(&flag).is_none());
        drop(guard);
        assert!(FlushGuard::try_acquire(&flag).is_some());
        assert!(!flag.load(Ordering::Acquire));
    }

    #[test]
    fn test_guard_released_on_early_return() {
        fn bail(flag: &AtomicBool) -> Result<(), &'static str> {
            let _guard = FlushGuard::try_acquire(flag).ok_or("busy")?;
            if flag.load(Ordering::Acquire) {
                return Err("volume gone");
            }
            Ok(())
        }
        let flag = AtomicBool::new(false);
        assert_eq!(bail(&flag), Err("volume gone"));
        assert!(!flag.load(Ordering::Acquire));
    }
}
