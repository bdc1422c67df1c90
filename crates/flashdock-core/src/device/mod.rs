//! Device state machine
//!
//! The state machine is the only place that changes [`DeviceState`]. It
//! owns the current manifest and the "flash in progress" guard; both are
//! updated together under one lock, so a trigger never sees a manifest
//! that is being replaced and two flashes can never overlap.
//!
//! ```text
//!            storage exposed               storage available
//!   Ready ─────────────────▶ StorageExposed ────────────────▶ Ready | Error
//!     │ trigger
//!     ▼
//!  Flashing ──── completion ───▶ Ready (success) | Error (failure)
//! ```

mod events;

pub use events::{Bindings, ButtonAction, DockEvent, Gesture};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use crate::discovery;
use crate::flash::FlashOutcome;
use crate::manifest::Manifest;

/// Externally visible device state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceState {
    /// Idle, a trigger may start a flash
    Ready,
    /// The host owns the storage
    StorageExposed,
    /// A flash is running
    Flashing,
    /// The last scan or flash failed
    Error,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceState::Ready => "ready",
            DeviceState::StorageExposed => "storage exposed",
            DeviceState::Flashing => "flashing",
            DeviceState::Error => "error",
        })
    }
}

/// Status indicator driver
pub trait Indicator: Send + Sync {
    /// Show `state`
    fn set(&self, state: DeviceState);
}

/// Removable-storage transport query
pub trait StorageStatus: Send + Sync {
    /// Whether the host currently has the storage claimed
    fn is_claimed_externally(&self) -> bool;
}

/// Why a trigger did not start a flash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TriggerRejected {
    /// The host owns the storage
    #[error("storage is exposed to the host")]
    StorageExposed,
    /// No valid manifest has been loaded
    #[error("no manifest loaded")]
    NoManifest,
    /// A flash is already running
    #[error("a flash is already in progress")]
    FlashInProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MountEvent {
    Exposed,
    Available,
}

struct Inner {
    state: DeviceState,
    manifest: Option<Arc<Manifest>>,
    flashing: bool,
    deferred: Vec<MountEvent>,
}

/// The dock's state machine
pub struct DeviceStateMachine {
    inner: Mutex<Inner>,
    storage_root: PathBuf,
    manifest_name: String,
    indicator: Arc<dyn Indicator>,
    storage: Arc<dyn StorageStatus>,
}

impl DeviceStateMachine {
    /// Create a state machine in the `Ready` state with no manifest
    pub fn new(
        storage_root: impl Into<PathBuf>,
        manifest_name: impl Into<String>,
        indicator: Arc<dyn Indicator>,
        storage: Arc<dyn StorageStatus>,
    ) -> Self {
        indicator.set(DeviceState::Ready);
        Self {
            inner: Mutex::new(Inner {
                state: DeviceState::Ready,
                manifest: None,
                flashing: false,
                deferred: Vec::new(),
            }),
            storage_root: storage_root.into(),
            manifest_name: manifest_name.into(),
            indicator,
            storage,
        }
    }

    /// Current state
    pub fn state(&self) -> DeviceState {
        self.lock().state
    }

    /// Current manifest, if any
    pub fn manifest(&self) -> Option<Arc<Manifest>> {
        self.lock().manifest.clone()
    }

    /// Directory searched for the manifest
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Storage became internally available
    ///
    /// Searches the storage for a manifest and replaces the current one.
    /// Deferred while a flash is running.
    pub fn storage_available(&self) {
        let mut inner = self.lock();
        if inner.flashing {
            log::info!("device: storage available while flashing, deferred");
            inner.deferred.push(MountEvent::Available);
            return;
        }
        self.scan(&mut inner);
    }

    /// Storage became externally visible
    ///
    /// Deferred while a flash is running.
    pub fn storage_exposed(&self) {
        let mut inner = self.lock();
        if inner.flashing {
            log::info!("device: storage exposed while flashing, deferred");
            inner.deferred.push(MountEvent::Exposed);
            return;
        }
        self.transition(&mut inner, DeviceState::StorageExposed);
    }

    /// Search the storage again without a mount event
    pub fn rescan(&self) -> Result<(), TriggerRejected> {
        let mut inner = self.lock();
        self.check_idle(&inner)?;
        self.scan(&mut inner);
        Ok(())
    }

    /// Log the current manifest
    pub fn dump(&self) {
        match self.manifest() {
            Some(manifest) => manifest.dump(),
            None => log::warn!("device: no manifest loaded"),
        }
    }

    /// Try to start a flash
    ///
    /// On success the device is `Flashing` and the caller owns the run; it
    /// must report back through [`finish_flash`](Self::finish_flash).
    pub fn begin_flash(&self) -> Result<Arc<Manifest>, TriggerRejected> {
        let mut inner = self.lock();
        let result = self.check_idle(&inner).and_then(|()| {
            inner.manifest.clone().ok_or(TriggerRejected::NoManifest)
        });
        let manifest = match result {
            Ok(manifest) => manifest,
            Err(e) => {
                log::warn!("device: trigger rejected: {}", e);
                return Err(e);
            }
        };

        inner.flashing = true;
        self.transition(&mut inner, DeviceState::Flashing);
        Ok(manifest)
    }

    /// Report the end of the run started by [`begin_flash`](Self::begin_flash)
    ///
    /// Mount events that arrived during the run are applied afterwards, in
    /// arrival order.
    pub fn finish_flash(&self, outcome: &FlashOutcome) {
        let mut inner = self.lock();
        if !inner.flashing {
            log::warn!("device: completion reported with no flash running");
            return;
        }
        inner.flashing = false;

        if outcome.is_success() {
            log::info!("device: flash finished");
            self.transition(&mut inner, DeviceState::Ready);
        } else {
            log::error!("device: flash {}", outcome);
            self.transition(&mut inner, DeviceState::Error);
        }
        self.apply_deferred(&mut inner);
    }

    /// Release the guard after a run that never started
    pub(crate) fn abort_flash(&self) {
        let mut inner = self.lock();
        if inner.flashing {
            inner.flashing = false;
            self.transition(&mut inner, DeviceState::Error);
            self.apply_deferred(&mut inner);
        }
    }

    fn check_idle(&self, inner: &Inner) -> Result<(), TriggerRejected> {
        if inner.flashing {
            Err(TriggerRejected::FlashInProgress)
        } else if inner.state == DeviceState::StorageExposed || self.storage.is_claimed_externally()
        {
            Err(TriggerRejected::StorageExposed)
        } else {
            Ok(())
        }
    }

    fn apply_deferred(&self, inner: &mut Inner) {
        let deferred = std::mem::take(&mut inner.deferred);
        for event in deferred {
            match event {
                MountEvent::Exposed => self.transition(inner, DeviceState::StorageExposed),
                MountEvent::Available => self.scan(inner),
            }
        }
    }

    fn scan(&self, inner: &mut Inner) {
        match discovery::load_manifest(&self.storage_root, &self.manifest_name) {
            Ok(manifest) => {
                log::info!(
                    "device: loaded manifest from {} ({} entries)",
                    manifest.source_dir().display(),
                    manifest.len()
                );
                manifest.dump();
                inner.manifest = Some(Arc::new(manifest));
                self.transition(inner, DeviceState::Ready);
            }
            Err(e) => {
                log::error!("device: no usable manifest: {}", e);
                inner.manifest = None;
                self.transition(inner, DeviceState::Error);
            }
        }
    }

    fn transition(&self, inner: &mut Inner, state: DeviceState) {
        if inner.state != state {
            log::debug!("device: {} -> {}", inner.state, state);
        }
        inner.state = state;
        self.indicator.set(state);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every field is valid after each statement; ignore poisoning.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
