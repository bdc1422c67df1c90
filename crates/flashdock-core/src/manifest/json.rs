//! JSON manifest parsing
//!
//! Parses the `flasher_args.json` files ESP-IDF writes next to its build
//! output:
//!
//! ```json
//! {
//!     "flash_settings": { "flash_mode": "dio", "flash_size": "4MB", "flash_freq": "40m" },
//!     "flash_files": {
//!         "0x1000": "bootloader/bootloader.bin",
//!         "0x8000": "partition_table/partition-table.bin",
//!         "0x10000": "app.bin"
//!     },
//!     "extra_esptool_args": { "chip": "esp32" }
//! }
//! ```
//!
//! Only `flash_files` is required. Its order is the programming order.

use std::fs::File;
use std::path::Path;

use std::fmt;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde_json::Value;

use super::{FlashEntry, FlashSettings, Manifest};
use crate::chip::TargetChip;
use crate::error::{ManifestError, Result};

const FLASH_FILES: &str = "flash_files";

/// Top-level manifest document
#[derive(Debug, serde::Deserialize)]
struct JsonManifest {
    flash_files: Option<FlashFiles>,
    #[serde(default)]
    extra_esptool_args: Option<JsonEsptoolArgs>,
    #[serde(default)]
    flash_settings: Option<FlashSettings>,
}

/// `flash_files` entries in document order
///
/// A key that appears twice is an error rather than a silent overwrite.
#[derive(Debug)]
struct FlashFiles(Vec<(String, Value)>);

impl<'de> serde::Deserialize<'de> for FlashFiles {
    fn deserialize<D>(deserializer: D) -> core::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FilesVisitor;

        impl<'de> Visitor<'de> for FilesVisitor {
            type Value = FlashFiles;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of load addresses to file names")
            }

            fn visit_map<A>(self, mut map: A) -> core::result::Result<FlashFiles, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries: Vec<(String, Value)> = Vec::new();
                while let Some((key, value)) = map.next_entry::<String, Value>()? {
                    if entries.iter().any(|(k, _)| *k == key) {
                        return Err(de::Error::custom(format_args!(
                            "duplicate {} key \"{}\"",
                            FLASH_FILES, key
                        )));
                    }
                    entries.push((key, value));
                }
                Ok(FlashFiles(entries))
            }
        }

        deserializer.deserialize_map(FilesVisitor)
    }
}

/// The esptool block; only the chip name is of interest
#[derive(Debug, serde::Deserialize)]
struct JsonEsptoolArgs {
    #[serde(default)]
    chip: Option<String>,
}

/// Parse a load address the way `strtoul(s, NULL, 0)` reads it
///
/// `0x`/`0X` prefixes select hexadecimal, a leading `0` selects octal,
/// anything else is decimal.
pub fn parse_address(s: &str) -> core::result::Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e))
    } else if s.len() > 1 && s.starts_with('0') {
        u32::from_str_radix(&s[1..], 8).map_err(|e| format!("invalid octal: {}", e))
    } else {
        s.parse().map_err(|e| format!("invalid number: {}", e))
    }
}

impl Manifest {
    /// Build a manifest from the raw bytes of a manifest file
    ///
    /// `containing_directory` is where the manifest was found; payload
    /// names are resolved against it. Every payload is stat'd, and the
    /// first problem aborts the whole parse.
    pub fn parse(bytes: &[u8], containing_directory: &Path) -> Result<Self> {
        // Firmware-side readers NUL-terminate the buffer
        let bytes = match bytes.iter().rposition(|&b| b != 0) {
            Some(last) => &bytes[..=last],
            None => bytes,
        };

        let doc: JsonManifest = serde_json::from_slice(bytes)
            .map_err(|e| ManifestError::MalformedDocument(e.to_string()))?;

        let FlashFiles(files) = doc
            .flash_files
            .ok_or(ManifestError::MissingRequiredField(FLASH_FILES))?;
        if files.is_empty() {
            return Err(ManifestError::EmptyFileList);
        }

        let base = std::path::absolute(containing_directory)?;

        let mut entries = Vec::new();
        entries
            .try_reserve_exact(files.len())
            .map_err(|_| ManifestError::AllocationFailed)?;

        for (key, value) in &files {
            let name = value.as_str().ok_or_else(|| {
                ManifestError::MalformedDocument(format!(
                    "{}[\"{}\"] is not a file name",
                    FLASH_FILES, key
                ))
            })?;
            let load_address =
                parse_address(key).map_err(|_| ManifestError::InvalidAddress(key.clone()))?;
            let file_path = base.join(name);

            let meta = File::open(&file_path)
                .and_then(|f| f.metadata())
                .map_err(|source| ManifestError::PayloadFileMissing {
                    path: file_path.clone(),
                    source,
                })?;
            if !meta.is_file() {
                return Err(ManifestError::PayloadFileMissing {
                    path: file_path,
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "not a regular file",
                    ),
                });
            }
            if meta.len() == 0 {
                return Err(ManifestError::EmptyPayload(file_path));
            }
            let byte_length =
                u32::try_from(meta.len()).map_err(|_| ManifestError::PayloadTooLarge {
                    path: file_path.clone(),
                    size: meta.len(),
                })?;

            entries.push(FlashEntry {
                load_address,
                file_path,
                byte_length,
            });
        }

        for (i, a) in entries.iter().enumerate() {
            for b in &entries[i + 1..] {
                if a.overlaps(b) {
                    log::warn!(
                        "manifest: {} at 0x{:X} overlaps {} at 0x{:X}",
                        a.file_path.display(),
                        a.load_address,
                        b.file_path.display(),
                        b.load_address
                    );
                }
            }
        }

        let target_chip = match doc.extra_esptool_args.and_then(|args| args.chip) {
            Some(name) => {
                let chip = TargetChip::from_name(&name);
                if chip.is_none() {
                    log::warn!("manifest: unrecognized chip \"{}\", treating as unspecified", name);
                }
                chip
            }
            None => None,
        };

        Ok(Manifest {
            target_chip,
            entries,
            flash_settings: doc.flash_settings,
            source_dir: base,
        })
    }
}
