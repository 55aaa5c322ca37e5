//! This module contains the traits used to talk to a block device.
//!
//! Devices are represented by the [`DiskReader`] and [`DiskWriter`] traits, which are implemented
//! for byte slices and vectors by default. The errors returned by these traits are [`DiskError`].

use crate::{SECTOR_SIZE, Sector};

/// Errors that can occur when reading or writing to a disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DiskError {
    /// The requested sector lies past the end of the device.
    #[error("sector {sector} is out of bounds (device has {sector_count} sectors)")]
    OutOfBounds { sector: u32, sector_count: u32 },
    /// The backing storage failed to complete the transfer.
    #[error("device I/O failure")]
    Io,
}

/// A trait for reading from a disk.
///
/// Reads are always done in whole [`SECTOR_SIZE`] sectors.
/// See [`DiskWriter`] for writing to a disk.
///
/// # Examples
/// ```
/// use rsfs_io::{DiskReader, DiskError, SECTOR_SIZE};
///
/// let mut disk = [0u8; 2 * SECTOR_SIZE];
/// let reader = &mut disk[..];
/// let mut buffer = [0u8; SECTOR_SIZE];
///
/// assert_eq!(reader.sector_count(), 2);
/// reader.read_sector(1, &mut buffer)?;
/// assert!(reader.read_sector(2, &mut buffer).is_err());
/// # Ok::<(), DiskError>(())
/// ```
pub trait DiskReader {
    /// Total number of sectors on the device.
    fn sector_count(&self) -> u32;

    /// Reads a sector from the disk into the given buffer.
    ///
    /// # Errors
    /// This function will return an error if the requested sector is out of bounds, or if there is
    /// an error while reading from the disk.
    fn read_sector(&mut self, sector: u32, buffer: &mut Sector) -> Result<(), DiskError>;
}

/// A trait for writing to a disk.
///
/// Writes are always done in whole [`SECTOR_SIZE`] sectors.
/// See [`DiskReader`] for reading from a disk.
pub trait DiskWriter {
    /// Writes a sector to the disk from the given buffer.
    ///
    /// # Errors
    /// This function will return an error if the requested sector is out of bounds, or if there is
    /// an error while writing to the disk.
    fn write_sector(&mut self, sector: u32, buffer: &Sector) -> Result<(), DiskError>;
}

/// A unified trait for [`DiskReader`] and [`DiskWriter`].
pub trait Disk: DiskReader + DiskWriter {}

impl<T: DiskReader + DiskWriter + ?Sized> Disk for T {}

/// Creates a zeroed in-memory device with the given number of sectors.
#[cfg(feature = "alloc")]
pub fn image(sectors: u32) -> alloc::vec::Vec<u8> {
    alloc::vec![0u8; sectors as usize * SECTOR_SIZE]
}

/// Implementations of [`DiskReader`] and [`DiskWriter`] for byte slices.
#[doc(hidden)]
mod impls {
    use super::*;

    fn sector_range(len: usize, sector: u32) -> Result<core::ops::Range<usize>, DiskError> {
        let sector_count = (len / SECTOR_SIZE).min(u32::MAX as usize) as u32;
        if sector >= sector_count {
            return Err(DiskError::OutOfBounds {
                sector,
                sector_count,
            });
        }
        let offset = sector as usize * SECTOR_SIZE;
        Ok(offset..offset + SECTOR_SIZE)
    }

    impl DiskReader for [u8] {
        fn sector_count(&self) -> u32 {
            (self.len() / SECTOR_SIZE).min(u32::MAX as usize) as u32
        }

        fn read_sector(&mut self, sector: u32, buffer: &mut Sector) -> Result<(), DiskError> {
            let range = sector_range(self.len(), sector)?;
            buffer.copy_from_slice(&self[range]);
            Ok(())
        }
    }

    impl DiskWriter for [u8] {
        fn write_sector(&mut self, sector: u32, buffer: &Sector) -> Result<(), DiskError> {
            let range = sector_range(self.len(), sector)?;
            self[range].copy_from_slice(buffer);
            Ok(())
        }
    }

    impl<T: DiskReader + ?Sized> DiskReader for &mut T {
        fn sector_count(&self) -> u32 {
            (**self).sector_count()
        }

        fn read_sector(&mut self, sector: u32, buffer: &mut Sector) -> Result<(), DiskError> {
            (**self).read_sector(sector, buffer)
        }
    }

    impl<T: DiskWriter + ?Sized> DiskWriter for &mut T {
        fn write_sector(&mut self, sector: u32, buffer: &Sector) -> Result<(), DiskError> {
            (**self).write_sector(sector, buffer)
        }
    }

    #[cfg(feature = "alloc")]
    impl DiskReader for alloc::vec::Vec<u8> {
        fn sector_count(&self) -> u32 {
            self.as_slice().sector_count()
        }

        fn read_sector(&mut self, sector: u32, buffer: &mut Sector) -> Result<(), DiskError> {
            self.as_mut_slice().read_sector(sector, buffer)
        }
    }

    #[cfg(feature = "alloc")]
    impl DiskWriter for alloc::vec::Vec<u8> {
        fn write_sector(&mut self, sector: u32, buffer: &Sector) -> Result<(), DiskError> {
            self.as_mut_slice().write_sector(sector, buffer)
        }
    }
}
