//! Scratch file management.
//!
//! The engine only reads and writes files, so every buffer-in/buffer-out
//! conversion goes through short-lived files on disk. This module owns them:
//!
//! - [`TempPathAllocator`] hands out unique paths in a process-scoped directory
//! - [`ScratchScope`] ties those paths to one request and removes them on
//!   every exit path, including cancellation

mod allocator;
mod scope;

pub use allocator::{Release, TempPathAllocator};
pub use scope::{CleanupReport, ScratchFile, ScratchScope};
