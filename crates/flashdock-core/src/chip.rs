//! Target chip identities
//!
//! The set of chip families is closed. A manifest may name one of them;
//! a driver reports which one actually answered the handshake.

use core::fmt;

/// A target chip family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetChip {
    /// ESP8266
    Esp8266,
    /// ESP32
    Esp32,
    /// ESP32-S2
    Esp32s2,
    /// ESP32-C3
    Esp32c3,
    /// ESP32-S3
    Esp32s3,
    /// ESP32-C2
    Esp32c2,
    /// ESP32-H2
    Esp32h2,
    /// ESP32-C6
    Esp32c6,
    /// A chip answered but was not recognized
    Unknown,
}

impl TargetChip {
    /// All recognized families, in manifest-name order
    pub const KNOWN: [TargetChip; 8] = [
        TargetChip::Esp8266,
        TargetChip::Esp32,
        TargetChip::Esp32s2,
        TargetChip::Esp32c3,
        TargetChip::Esp32s3,
        TargetChip::Esp32c2,
        TargetChip::Esp32h2,
        TargetChip::Esp32c6,
    ];

    /// Look up a family by its lowercase manifest name
    ///
    /// Matching is case-sensitive. Unrecognized names return `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::KNOWN.into_iter().find(|chip| chip.name() == name)
    }

    /// Lowercase name as used in manifests
    pub fn name(&self) -> &'static str {
        match self {
            Self::Esp8266 => "esp8266",
            Self::Esp32 => "esp32",
            Self::Esp32s2 => "esp32s2",
            Self::Esp32c3 => "esp32c3",
            Self::Esp32s3 => "esp32s3",
            Self::Esp32c2 => "esp32c2",
            Self::Esp32h2 => "esp32h2",
            Self::Esp32c6 => "esp32c6",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the ROM loader can switch the link rate
    pub fn supports_rate_change(&self) -> bool {
        !matches!(self, Self::Esp8266)
    }

    /// Whether the ROM loader can digest a flash region
    pub fn supports_flash_digest(&self) -> bool {
        !matches!(self, Self::Esp8266)
    }
}

impl fmt::Display for TargetChip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity of the chip present on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetIdentity {
    /// Detected family
    pub chip: TargetChip,
    /// Raw chip-detect value read during the handshake
    pub magic: u32,
}
