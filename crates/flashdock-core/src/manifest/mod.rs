//! Flash manifest support
//!
//! A manifest says which payload files go to which target addresses, and
//! optionally which chip family they are built for. Manifests are built
//! all-or-nothing: either every entry is valid and every payload exists,
//! or parsing fails.
//!
//! ```ignore
//! let found = discovery::find(root, "flasher_args.json")?.unwrap();
//! let manifest = Manifest::parse(&found.bytes, &found.dir)?;
//! manifest.dump();
//! ```

mod json;
mod types;

pub use json::parse_address;
pub use types::*;
