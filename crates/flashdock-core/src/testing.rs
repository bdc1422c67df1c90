//! Test doubles shared by the unit tests

use std::fs;
use std::io::Read;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use crate::chip::{TargetChip, TargetIdentity};
use crate::error::ProtocolError;
use crate::flash::FlashProgress;
use crate::loader::{Loader, Result, FLASH_BLOCK_SIZE};
use crate::manifest::{FlashEntry, Manifest};

/// A recorded loader call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    NegotiateRate(u32),
    Program { address: u32, length: u32 },
    Verify,
    Disconnect,
}

/// Scriptable in-memory loader
pub struct MockLoader {
    pub calls: Arc<Mutex<Vec<Call>>>,
    pub identity: TargetIdentity,
    pub connect_error: Option<ProtocolError>,
    pub rate_error: Option<ProtocolError>,
    pub verify_error: Option<ProtocolError>,
    /// Fail the program call with this index (0-based) mid-stream
    pub fail_program_at: Option<usize>,
    /// When set, `connect` blocks until a message arrives
    pub gate: Option<Receiver<()>>,
    programs: usize,
}

impl MockLoader {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            identity: TargetIdentity {
                chip: TargetChip::Esp32,
                magic: 0x00F0_1D83,
            },
            connect_error: None,
            rate_error: None,
            verify_error: None,
            fail_program_at: None,
            gate: None,
            programs: 0,
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Loader for MockLoader {
    fn connect(&mut self) -> Result<TargetIdentity> {
        self.record(Call::Connect);
        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        match &self.connect_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.identity),
        }
    }

    fn negotiate_rate(&mut self, rate: u32) -> Result<()> {
        self.record(Call::NegotiateRate(rate));
        match &self.rate_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn program(
        &mut self,
        address: u32,
        length: u32,
        payload: &mut dyn Read,
        progress: &mut dyn FlashProgress,
    ) -> Result<()> {
        self.record(Call::Program { address, length });
        let index = self.programs;
        self.programs += 1;

        progress.erasing(address, length);
        let mut buf = [0u8; FLASH_BLOCK_SIZE];
        let mut written = 0u32;
        while written < length {
            if self.fail_program_at == Some(index) && written > 0 {
                return Err(ProtocolError::TransportError("link dropped".into()));
            }
            let want = (length - written).min(FLASH_BLOCK_SIZE as u32) as usize;
            let n = payload
                .read(&mut buf[..want])
                .map_err(|e| ProtocolError::TransportError(e.to_string()))?;
            if n == 0 {
                return Err(ProtocolError::TruncatedImage {
                    expected: length,
                    delivered: written,
                });
            }
            written += n as u32;
            progress.write_progress(written, length);
        }
        if self.fail_program_at == Some(index) {
            return Err(ProtocolError::TransportError("link dropped".into()));
        }
        Ok(())
    }

    fn verify(&mut self) -> Result<()> {
        self.record(Call::Verify);
        match &self.verify_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn disconnect(&mut self) {
        self.record(Call::Disconnect);
    }
}

/// Write payload files and a manifest into a fresh directory
pub fn manifest_dir(files: &[(&str, &str, usize)], chip: Option<&str>) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let mut pairs = Vec::new();
    for (addr, name, len) in files {
        fs::write(dir.path().join(name), vec![0x5A; *len]).unwrap();
        pairs.push(format!("\"{}\": \"{}\"", addr, name));
    }
    let chip = chip
        .map(|c| format!(", \"extra_esptool_args\": {{\"chip\": \"{}\"}}", c))
        .unwrap_or_default();
    let json = format!("{{\"flash_files\": {{{}}}{}}}", pairs.join(", "), chip);
    fs::write(dir.path().join("flasher_args.json"), json).unwrap();
    dir
}

/// Build a manifest from `files` in a fresh directory
pub fn manifest(files: &[(&str, &str, usize)], chip: Option<&str>) -> (TempDir, Manifest) {
    let dir = manifest_dir(files, chip);
    let bytes = fs::read(dir.path().join("flasher_args.json")).unwrap();
    let manifest = Manifest::parse(&bytes, dir.path()).unwrap();
    (dir, manifest)
}

/// Progress recorder
#[derive(Default)]
pub struct RecordingProgress {
    pub started: Vec<usize>,
    pub finished: Vec<usize>,
    pub writes: Vec<(u32, u32)>,
}

impl FlashProgress for RecordingProgress {
    fn connecting(&mut self) {}

    fn entry_started(&mut self, index: usize, _entry: &FlashEntry) {
        self.started.push(index);
    }

    fn erasing(&mut self, _address: u32, _length: u32) {}

    fn write_progress(&mut self, written: u32, total: u32) {
        self.writes.push((written, total));
    }

    fn verifying(&mut self, _address: u32) {}

    fn entry_finished(&mut self, index: usize) {
        self.finished.push(index);
    }
}
