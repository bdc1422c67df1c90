//! Loader trait definitions

use std::io::Read;

use crate::chip::TargetIdentity;
use crate::error::ProtocolError;
use crate::flash::FlashProgress;

/// Protocol result type
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Image block size used for programming
pub const FLASH_BLOCK_SIZE: usize = 1024;

/// A bootloader session driver
///
/// One session is `connect`, any number of `program`/`verify` pairs, and
/// exactly one `disconnect`. Drivers report outcomes; they never touch the
/// device state.
///
/// ## Session discipline
///
/// `connect` acquires the link and `disconnect` releases it. Callers must
/// call `disconnect` once per session however the session ended,
/// including after a failed `connect`. Use [`Session`] to get that for
/// free.
pub trait Loader {
    /// Reset the target into its bootloader and synchronize
    ///
    /// Returns the identity of the chip that answered.
    fn connect(&mut self) -> Result<TargetIdentity>;

    /// Switch the link to a faster rate
    ///
    /// Drivers skip this for chip families that cannot change rate and
    /// return `Ok`. `UnsupportedFunction` means the target refused; the
    /// caller decides whether that matters.
    fn negotiate_rate(&mut self, rate: u32) -> Result<()>;

    /// Erase and program `length` bytes from `payload` at `address`
    ///
    /// The payload is streamed in [`FLASH_BLOCK_SIZE`] chunks; the last one
    /// may be shorter. Progress is reported after every chunk. A payload
    /// that ends early fails with `TruncatedImage`.
    fn program(
        &mut self,
        address: u32,
        length: u32,
        payload: &mut dyn Read,
        progress: &mut dyn FlashProgress,
    ) -> Result<()>;

    /// Check the region written by the last `program` call
    ///
    /// `UnsupportedFunction` means the target cannot check.
    fn verify(&mut self) -> Result<()>;

    /// Release the link
    fn disconnect(&mut self);
}

impl<L: Loader + ?Sized> Loader for Box<L> {
    fn connect(&mut self) -> Result<TargetIdentity> {
        (**self).connect()
    }

    fn negotiate_rate(&mut self, rate: u32) -> Result<()> {
        (**self).negotiate_rate(rate)
    }

    fn program(
        &mut self,
        address: u32,
        length: u32,
        payload: &mut dyn Read,
        progress: &mut dyn FlashProgress,
    ) -> Result<()> {
        (**self).program(address, length, payload, progress)
    }

    fn verify(&mut self) -> Result<()> {
        (**self).verify()
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }
}

/// Scoped loader session
///
/// Dropping the session disconnects the loader, so every exit path of the
/// code holding it releases the link exactly once.
pub struct Session<'a, L: Loader + ?Sized> {
    loader: &'a mut L,
}

impl<'a, L: Loader + ?Sized> Session<'a, L> {
    /// Start a session on `loader`
    pub fn new(loader: &'a mut L) -> Self {
        Self { loader }
    }
}

impl<L: Loader + ?Sized> core::ops::Deref for Session<'_, L> {
    type Target = L;

    fn deref(&self) -> &L {
        self.loader
    }
}

impl<L: Loader + ?Sized> core::ops::DerefMut for Session<'_, L> {
    fn deref_mut(&mut self) -> &mut L {
        self.loader
    }
}

impl<L: Loader + ?Sized> Drop for Session<'_, L> {
    fn drop(&mut self) {
        self.loader.disconnect();
    }
}
