//! Progress reporting

use crate::manifest::FlashEntry;

/// Callback for progress reporting during a flash run
///
/// Notifications are fire-and-forget: implementations must return quickly
/// and never fail.
pub trait FlashProgress {
    /// Called before the handshake
    fn connecting(&mut self);

    /// Called when an entry is about to be programmed
    fn entry_started(&mut self, index: usize, entry: &FlashEntry);

    /// Called before the region for an entry is erased
    fn erasing(&mut self, address: u32, length: u32);

    /// Called after every chunk with the bytes written so far
    fn write_progress(&mut self, written: u32, total: u32);

    /// Called before the written region is checked
    fn verifying(&mut self, address: u32);

    /// Called when an entry has been programmed (and checked)
    fn entry_finished(&mut self, index: usize);
}

/// A no-op progress reporter
pub struct NoProgress;

impl FlashProgress for NoProgress {
    fn connecting(&mut self) {}
    fn entry_started(&mut self, _index: usize, _entry: &FlashEntry) {}
    fn erasing(&mut self, _address: u32, _length: u32) {}
    fn write_progress(&mut self, _written: u32, _total: u32) {}
    fn verifying(&mut self, _address: u32) {}
    fn entry_finished(&mut self, _index: usize) {}
}

impl<P: FlashProgress + ?Sized> FlashProgress for Box<P> {
    fn connecting(&mut self) {
        (**self).connecting()
    }

    fn entry_started(&mut self, index: usize, entry: &FlashEntry) {
        (**self).entry_started(index, entry)
    }

    fn erasing(&mut self, address: u32, length: u32) {
        (**self).erasing(address, length)
    }

    fn write_progress(&mut self, written: u32, total: u32) {
        (**self).write_progress(written, total)
    }

    fn verifying(&mut self, address: u32) {
        (**self).verifying(address)
    }

    fn entry_finished(&mut self, index: usize) {
        (**self).entry_finished(index)
    }
}
