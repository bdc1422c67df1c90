//! flashdock-core - Core library for the flashing dock
//!
//! This crate holds everything about the dock that does not touch a wire:
//! the manifest model, the directory search that finds it, the `Loader`
//! abstraction a bootloader driver implements, the orchestrator that runs
//! a manifest through a loader, and the device state machine that decides
//! when a flash may start.
//!
//! # Example
//!
//! ```ignore
//! use flashdock_core::discovery;
//! use flashdock_core::flash::{FlashOptions, FlashOrchestrator, NoProgress};
//!
//! let manifest = discovery::load_manifest("/data", "flasher_args.json")?;
//! let orchestrator = FlashOrchestrator::new(FlashOptions::default());
//! let outcome = orchestrator.run(&mut loader, &manifest, &mut NoProgress);
//! println!("{}", outcome);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod chip;
pub mod config;
pub mod device;
pub mod discovery;
pub mod dock;
pub mod error;
pub mod flash;
pub mod loader;
pub mod manifest;

pub use error::{FlashError, ManifestError, ProtocolError};

#[cfg(test)]
mod testing;
