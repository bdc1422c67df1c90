//! Dock runtime
//!
//! Ties the state machine to a single flashing worker. Events are
//! dispatched on the caller's thread; an accepted trigger hands the
//! manifest to the worker through a channel, and the worker reports the
//! outcome back to the state machine when the run ends.

use std::io;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::DockConfig;
use crate::device::{
    Bindings, ButtonAction, DeviceStateMachine, DockEvent, Indicator, StorageStatus,
    TriggerRejected,
};
use crate::flash::{FlashOrchestrator, FlashProgress};
use crate::loader::Loader;
use crate::manifest::Manifest;

/// A running dock
pub struct Dock {
    machine: Arc<DeviceStateMachine>,
    bindings: Bindings,
    jobs: Option<Sender<Arc<Manifest>>>,
    worker: Option<JoinHandle<()>>,
}

impl Dock {
    /// Start the dock
    ///
    /// Builds the state machine, starts the flashing worker, and scans the
    /// storage unless the host has it claimed.
    pub fn spawn<L, P>(
        config: &DockConfig,
        mut loader: L,
        indicator: Arc<dyn Indicator>,
        storage: Arc<dyn StorageStatus>,
        mut progress: P,
    ) -> io::Result<Self>
    where
        L: Loader + Send + 'static,
        P: FlashProgress + Send + 'static,
    {
        let claimed = storage.is_claimed_externally();
        let machine = Arc::new(DeviceStateMachine::new(
            &config.storage_root,
            config.manifest_name.as_str(),
            indicator,
            storage,
        ));
        let orchestrator = FlashOrchestrator::new(config.flash_options());
        let (jobs, requests) = mpsc::channel::<Arc<Manifest>>();

        let worker_machine = Arc::clone(&machine);
        let worker = thread::Builder::new()
            .name("flashdock-worker".into())
            .spawn(move || {
                for manifest in requests {
                    let outcome = orchestrator.run(&mut loader, &manifest, &mut progress);
                    worker_machine.finish_flash(&outcome);
                }
                log::debug!("dock: worker stopped");
            })?;

        if claimed {
            machine.storage_exposed();
        } else {
            machine.storage_available();
        }

        Ok(Self {
            machine,
            bindings: config.buttons,
            jobs: Some(jobs),
            worker: Some(worker),
        })
    }

    /// The dock's state machine
    pub fn machine(&self) -> &Arc<DeviceStateMachine> {
        &self.machine
    }

    /// Handle one event
    ///
    /// Returns the rejection when a flash or rescan cannot run right now.
    pub fn dispatch(&self, event: DockEvent) -> Result<(), TriggerRejected> {
        match event {
            DockEvent::StorageVisibility {
                externally_visible: true,
            } => self.machine.storage_exposed(),
            DockEvent::StorageVisibility {
                externally_visible: false,
            } => self.machine.storage_available(),
            DockEvent::Button(gesture) => {
                let action = self.bindings.action(gesture);
                log::debug!("dock: {} -> {:?}", gesture, action);
                match action {
                    ButtonAction::Flash => self.trigger()?,
                    ButtonAction::Rescan => self.machine.rescan().inspect_err(|e| {
                        log::warn!("dock: rescan rejected: {}", e);
                    })?,
                    ButtonAction::Dump => self.machine.dump(),
                    ButtonAction::Ignore => {}
                }
            }
        }
        Ok(())
    }

    /// Request a flash of the current manifest
    pub fn trigger(&self) -> Result<(), TriggerRejected> {
        let manifest = self.machine.begin_flash()?;
        let sent = self.jobs.as_ref().map(|jobs| jobs.send(manifest));
        if !matches!(sent, Some(Ok(()))) {
            log::error!("dock: flashing worker is gone");
            self.machine.abort_flash();
        }
        Ok(())
    }

    /// Stop accepting work and wait for a running flash to finish
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("dock: flashing worker panicked");
            }
        }
    }
}

impl Drop for Dock {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceState, Gesture};
    use crate::flash::NoProgress;
    use crate::testing::{manifest_dir, Call, MockLoader};
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc::Receiver;
    use std::sync::Mutex;
    use std::time::Duration;

    struct ChannelIndicator(Mutex<Sender<DeviceState>>);

    impl Indicator for ChannelIndicator {
        fn set(&self, state: DeviceState) {
            let _ = self.0.lock().unwrap().send(state);
        }
    }

    #[derive(Default)]
    struct Claim(AtomicBool);

    impl StorageStatus for Claim {
        fn is_claimed_externally(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn config(root: &Path) -> DockConfig {
        DockConfig {
            storage_root: root.to_path_buf(),
            ..DockConfig::default()
        }
    }

    fn spawn(root: &Path, loader: MockLoader) -> (Dock, Receiver<DeviceState>, Arc<Claim>) {
        let (tx, rx) = mpsc::channel();
        let claim = Arc::new(Claim::default());
        let dock = Dock::spawn(
            &config(root),
            loader,
            Arc::new(ChannelIndicator(Mutex::new(tx))),
            claim.clone(),
            NoProgress,
        )
        .unwrap();
        (dock, rx, claim)
    }

    fn wait_for(rx: &Receiver<DeviceState>, want: DeviceState) {
        loop {
            let state = rx.recv_timeout(Duration::from_secs(10)).unwrap();
            if state == want {
                return;
            }
        }
    }

    fn connects(calls: &[Call]) -> usize {
        calls.iter().filter(|c| **c == Call::Connect).count()
    }

    #[test]
    fn test_click_flashes_manifest() {
        let dir = manifest_dir(&[("0x1000", "a.bin", 100), ("0x8000", "b.bin", 200)], None);
        let loader = MockLoader::new();
        let calls = loader.calls.clone();
        let (dock, rx, _) = spawn(dir.path(), loader);
        assert!(dock.machine().manifest().is_some());

        dock.dispatch(DockEvent::Button(Gesture::Click)).unwrap();
        wait_for(&rx, DeviceState::Flashing);
        wait_for(&rx, DeviceState::Ready);
        dock.shutdown();

        let calls = calls.lock().unwrap().clone();
        assert_eq!(calls.first(), Some(&Call::Connect));
        assert_eq!(calls.last(), Some(&Call::Disconnect));
        assert!(calls.contains(&Call::Program { address: 0x8000, length: 200 }));
    }

    #[test]
    fn test_trigger_while_flashing_is_rejected() {
        let dir = manifest_dir(&[("0x1000", "a.bin", 100)], None);
        let (gate_tx, gate_rx) = mpsc::channel();
        let mut loader = MockLoader::new();
        loader.gate = Some(gate_rx);
        let calls = loader.calls.clone();
        let (dock, rx, _) = spawn(dir.path(), loader);

        dock.dispatch(DockEvent::Button(Gesture::Click)).unwrap();
        assert_eq!(dock.machine().state(), DeviceState::Flashing);
        assert_eq!(
            dock.dispatch(DockEvent::Button(Gesture::Click)),
            Err(TriggerRejected::FlashInProgress)
        );
        assert_eq!(
            dock.dispatch(DockEvent::Button(Gesture::LongPress)),
            Err(TriggerRejected::FlashInProgress)
        );

        wait_for(&rx, DeviceState::Flashing);
        gate_tx.send(()).unwrap();
        wait_for(&rx, DeviceState::Ready);
        dock.shutdown();
        assert_eq!(connects(&calls.lock().unwrap()), 1);
    }

    #[test]
    fn test_exposed_storage_blocks_trigger() {
        let dir = manifest_dir(&[("0x1000", "a.bin", 100)], None);
        let loader = MockLoader::new();
        let calls = loader.calls.clone();
        let (dock, _rx, claim) = spawn(dir.path(), loader);

        claim.0.store(true, Ordering::SeqCst);
        dock.dispatch(DockEvent::StorageVisibility {
            externally_visible: true,
        })
        .unwrap();
        assert_eq!(
            dock.dispatch(DockEvent::Button(Gesture::Click)),
            Err(TriggerRejected::StorageExposed)
        );

        claim.0.store(false, Ordering::SeqCst);
        dock.dispatch(DockEvent::StorageVisibility {
            externally_visible: false,
        })
        .unwrap();
        assert_eq!(dock.machine().state(), DeviceState::Ready);
        dock.shutdown();
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failed_flash_sets_error() {
        let dir = manifest_dir(&[("0x1000", "a.bin", 100)], None);
        let mut loader = MockLoader::new();
        loader.connect_error = Some(crate::ProtocolError::HandshakeFailed);
        let (dock, rx, _) = spawn(dir.path(), loader);

        dock.trigger().unwrap();
        wait_for(&rx, DeviceState::Error);
        assert_eq!(dock.machine().state(), DeviceState::Error);
    }

    #[test]
    fn test_no_manifest_rejects_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let (dock, _rx, _) = spawn(dir.path(), MockLoader::new());
        assert_eq!(dock.machine().state(), DeviceState::Error);
        assert_eq!(dock.trigger(), Err(TriggerRejected::NoManifest));
        assert_eq!(dock.dispatch(DockEvent::Button(Gesture::DoubleClick)), Ok(()));
    }
}
