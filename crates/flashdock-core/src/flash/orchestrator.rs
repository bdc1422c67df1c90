//! Sequencing of a complete flash run

use std::fmt;
use std::fs::File;
use std::io::BufReader;

use crate::error::{FlashError, ProtocolError};
use crate::flash::FlashProgress;
use crate::loader::{Loader, Session};
use crate::manifest::{FlashEntry, Manifest};

/// Options for a flash run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashOptions {
    /// Switch the link to this rate after the handshake
    pub baud_rate: Option<u32>,
    /// Check every entry after writing it
    pub verify: bool,
}

impl Default for FlashOptions {
    fn default() -> Self {
        Self {
            baud_rate: None,
            verify: true,
        }
    }
}

/// Result of a flash run
#[derive(Debug)]
pub enum FlashOutcome {
    /// Every entry was programmed
    Success,
    /// The run stopped at the first failure
    Failure {
        /// What went wrong
        error: FlashError,
        /// Index of the entry being programmed, if any
        entry: Option<usize>,
    },
}

impl FlashOutcome {
    /// Whether the run programmed every entry
    pub fn is_success(&self) -> bool {
        matches!(self, FlashOutcome::Success)
    }

    /// Index of the entry that failed
    pub fn failed_entry(&self) -> Option<usize> {
        match self {
            FlashOutcome::Failure { entry, .. } => *entry,
            FlashOutcome::Success => None,
        }
    }

    fn failed(error: impl Into<FlashError>, entry: Option<usize>) -> Self {
        FlashOutcome::Failure {
            error: error.into(),
            entry,
        }
    }
}

impl fmt::Display for FlashOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashOutcome::Success => write!(f, "success"),
            FlashOutcome::Failure {
                error,
                entry: Some(i),
            } => write!(f, "failed at entry {}: {}", i, error),
            FlashOutcome::Failure { error, entry: None } => write!(f, "failed: {}", error),
        }
    }
}

/// Drives a [`Loader`] through one manifest
#[derive(Debug, Clone, Default)]
pub struct FlashOrchestrator {
    options: FlashOptions,
}

impl FlashOrchestrator {
    /// Create an orchestrator with the given options
    pub fn new(options: FlashOptions) -> Self {
        Self { options }
    }

    /// Options in effect
    pub fn options(&self) -> &FlashOptions {
        &self.options
    }

    /// Program every entry of `manifest` in order
    ///
    /// One loader session is opened for the whole run and closed on every
    /// exit path. The first failure stops the run.
    pub fn run<L: Loader + ?Sized>(
        &self,
        loader: &mut L,
        manifest: &Manifest,
        progress: &mut dyn FlashProgress,
    ) -> FlashOutcome {
        let mut session = Session::new(loader);

        progress.connecting();
        let identity = match session.connect() {
            Ok(identity) => identity,
            Err(e) => {
                log::error!("flash: cannot connect to target: {}", e);
                return FlashOutcome::failed(e, None);
            }
        };
        log::info!(
            "flash: connected to {} (magic 0x{:08X})",
            identity.chip,
            identity.magic
        );

        if let Some(expected) = manifest.target_chip() {
            if expected != identity.chip {
                let e = ProtocolError::IdentityMismatch {
                    expected,
                    found: identity.chip,
                };
                log::error!("flash: {}", e);
                return FlashOutcome::failed(e, None);
            }
        }

        if let Some(rate) = self.options.baud_rate {
            match session.negotiate_rate(rate) {
                Ok(()) => {}
                Err(ProtocolError::UnsupportedFunction(what)) => {
                    log::warn!("flash: {} not supported, staying at current rate", what);
                }
                Err(e) => {
                    log::error!("flash: rate change to {} failed: {}", rate, e);
                    return FlashOutcome::failed(e, None);
                }
            }
        }

        for (index, entry) in manifest.entries().iter().enumerate() {
            progress.entry_started(index, entry);
            if let Err(e) = self.program_entry(&mut *session, entry, progress) {
                log::error!(
                    "flash: entry {} ({}) at 0x{:08X} failed: {}",
                    index,
                    entry.file_path.display(),
                    entry.load_address,
                    e
                );
                return FlashOutcome::failed(e, Some(index));
            }
            progress.entry_finished(index);
        }

        log::info!(
            "flash: {} entries, {} bytes written",
            manifest.len(),
            manifest.total_bytes()
        );
        FlashOutcome::Success
    }

    fn program_entry<L: Loader + ?Sized>(
        &self,
        loader: &mut L,
        entry: &FlashEntry,
        progress: &mut dyn FlashProgress,
    ) -> Result<(), FlashError> {
        let payload_err = |source| FlashError::Payload {
            path: entry.file_path.clone(),
            source,
        };
        let file = File::open(&entry.file_path).map_err(payload_err)?;
        let size = file.metadata().map_err(payload_err)?.len();
        if size != u64::from(entry.byte_length) {
            return Err(FlashError::PayloadChanged {
                path: entry.file_path.clone(),
                expected: entry.byte_length,
                actual: size,
            });
        }

        log::info!(
            "flash: writing {} ({} bytes) at 0x{:08X}",
            entry.file_path.display(),
            entry.byte_length,
            entry.load_address
        );
        let mut reader = BufReader::new(file);
        loader.program(entry.load_address, entry.byte_length, &mut reader, progress)?;

        if self.options.verify {
            progress.verifying(entry.load_address);
            match loader.verify() {
                Ok(()) => log::debug!("flash: 0x{:08X} verified", entry.load_address),
                Err(ProtocolError::UnsupportedFunction(what)) => {
                    log::warn!("flash: {} not supported, skipping verification", what);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
