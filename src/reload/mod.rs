//! Hot reload engine: mtime polling, debounced lifecycle application, and
//! command declaration syncing.
//!
//! # Architecture
//!
//! ```text
//! HotReloader
//!   - PathRegistry (tracked modules, directories, dead set)
//!   - Periodic tick task (snapshot -> blocking stat pass -> fold)
//!   - DebounceArbiter (two stable scans confirm a change)
//!         |
//!    confirmed events
//!         |
//!   lifecycle apply (reload / load / unload via ReloaderHost)
//!         |
//!   DeclareScheduler (coalesces changes into one declaration)
//! ```

mod debounce;
mod declare;
mod lifecycle;
mod registry;
mod reloader;
mod scanner;

pub use reloader::{HotReloader, ReloaderStats};
