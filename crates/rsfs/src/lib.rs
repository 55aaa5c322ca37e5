//! A single-volume file system with a flat directory and a chained cluster allocator
//!
//! The volume is layered on a sector-addressed block device (see [`io`]). Space is managed
//! through a file allocation table of 2 byte entries, files are listed in a fixed table of
//! 128 entries, and each open file has a cursor that reads and writes a cluster at a time.
//!
//! ## Cargo Features
//!
//! - **std**: Enables the 'std' feature, which requires an 'std' environment
//! - **alloc**: Enables the 'alloc' feature, required for the in-memory tables
//! - **tool**: Enables analysis and diagnostic APIs ([`Volume::verify`], [`Volume::chain`])

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod error;
pub mod fs;
pub mod structures;

pub use error::{FsError, Result};
pub use fs::*;
pub use rsfs_io as io;
