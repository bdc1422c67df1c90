//! Manifest types

use std::path::{Path, PathBuf};

use crate::chip::TargetChip;

/// One payload to program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashEntry {
    /// Target memory offset
    pub load_address: u32,
    /// Absolute path of the payload
    pub file_path: PathBuf,
    /// Payload size captured when the manifest was built
    pub byte_length: u32,
}

impl FlashEntry {
    /// First address past the end of this entry
    pub fn end_address(&self) -> u64 {
        self.load_address as u64 + self.byte_length as u64
    }

    /// Check if this entry overlaps with another
    pub fn overlaps(&self, other: &FlashEntry) -> bool {
        (self.load_address as u64) < other.end_address()
            && (other.load_address as u64) < self.end_address()
    }
}

/// SPI flash parameters carried by ESP-IDF manifests
///
/// Values are kept as the strings the build system wrote; they are only
/// reported, never interpreted.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
pub struct FlashSettings {
    /// Flash mode, e.g. "dio"
    #[serde(default)]
    pub flash_mode: Option<String>,
    /// Flash size, e.g. "4MB"
    #[serde(default)]
    pub flash_size: Option<String>,
    /// Flash frequency, e.g. "40m"
    #[serde(default)]
    pub flash_freq: Option<String>,
}

/// A validated description of what to flash where
///
/// A manifest always has at least one entry, and every entry pointed at a
/// readable, non-empty file when it was built. It cannot be modified after
/// construction.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub(super) target_chip: Option<TargetChip>,
    pub(super) entries: Vec<FlashEntry>,
    pub(super) flash_settings: Option<FlashSettings>,
    pub(super) source_dir: PathBuf,
}

impl Manifest {
    /// Chip the manifest targets, `None` when unspecified
    pub fn target_chip(&self) -> Option<TargetChip> {
        self.target_chip
    }

    /// Entries in programming order
    pub fn entries(&self) -> &[FlashEntry] {
        &self.entries
    }

    /// Number of entries (never zero)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; present for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flash settings block, if the manifest had one
    pub fn flash_settings(&self) -> Option<&FlashSettings> {
        self.flash_settings.as_ref()
    }

    /// Directory the manifest was found in
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Sum of all payload sizes
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.byte_length as u64).sum()
    }

    /// Log the manifest contents
    pub fn dump(&self) {
        log::info!(
            "Flash {} file(s), target {}:",
            self.entries.len(),
            self.target_chip
                .map(|c| c.name())
                .unwrap_or("unspecified")
        );
        for entry in &self.entries {
            log::info!(
                "  0x{:08X}  {:>8} bytes  {}",
                entry.load_address,
                entry.byte_length,
                entry.file_path.display()
            );
        }
        if let Some(settings) = &self.flash_settings {
            log::info!(
                "  flash mode {}, size {}, freq {}",
                settings.flash_mode.as_deref().unwrap_or("-"),
                settings.flash_size.as_deref().unwrap_or("-"),
                settings.flash_freq.as_deref().unwrap_or("-")
            );
        }
    }
}
