//! Bootloader driver abstraction
//!
//! This module defines the trait a serial bootloader driver implements so
//! the orchestrator can run a manifest through it without knowing the wire
//! protocol.

mod traits;

pub use traits::*;
