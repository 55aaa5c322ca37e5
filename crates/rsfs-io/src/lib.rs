//! rsfs IO
//!
//! The sector-addressed block device that an rsfs volume is layered on.
//! The device knows nothing about files or clusters: it is a fixed number of
//! [`SECTOR_SIZE`] byte sectors that can be read and written by index.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod disk;

pub use disk::{Disk, DiskError, DiskReader, DiskWriter};
#[cfg(feature = "alloc")]
pub use disk::image;

/// Size of a single device sector, in bytes.
pub const SECTOR_SIZE: usize = 512;

/// A single sector worth of bytes.
pub type Sector = [u8; SECTOR_SIZE];
