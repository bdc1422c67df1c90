//! Flash orchestration
//!
//! Runs every entry of a [`Manifest`](crate::manifest::Manifest) through a
//! [`Loader`](crate::loader::Loader) in one session and reduces the result
//! to a single [`FlashOutcome`].

mod orchestrator;
mod progress;

pub use orchestrator::{FlashOptions, FlashOrchestrator, FlashOutcome};
pub use progress::{FlashProgress, NoProgress};
