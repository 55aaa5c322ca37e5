use alloc::{string::String, vec, vec::Vec};

use bytemuck::Zeroable;

use rsfs_io::{DiskError, DiskReader, DiskWriter, SECTOR_SIZE};

use crate::error::{FsError, Result};

use super::{
    fat::Cluster,
    raw::{
        constants::{DIR_SECTORS, DIR_SIZE, FAT_SECTORS, MAX_NAME_LEN, NAME_FIELD_LEN},
        directory::RawDirectoryEntry,
    },
};

/// Checks that `name` can be stored in a directory entry.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.bytes().any(|b| b == 0) {
        return Err(FsError::InvalidName);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(FsError::NameTooLong { len: name.len() });
    }
    Ok(())
}

/// Name and size of a file, as reported by listings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileInfo {
    pub name: String,
    pub size: u32,
}

impl core::fmt::Display for FileInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}\t\t{}", self.name, self.size)
    }
}

#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DirectoryEntry {
    data: RawDirectoryEntry,
}

impl core::fmt::Debug for DirectoryEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DirectoryEntry")
            .field("used", &self.is_used())
            .field("name", &String::from_utf8_lossy(self.name_bytes()))
            .field("first_block", &self.first_block())
            .field("size", &self.size())
            .finish()
    }
}

impl DirectoryEntry {
    /// Creates a used, empty entry. The name must already be validated.
    pub fn new(name: &str, first_block: Cluster) -> Self {
        debug_assert!(name.len() <= MAX_NAME_LEN);
        let mut raw_name = [0u8; NAME_FIELD_LEN];
        raw_name[..name.len()].copy_from_slice(name.as_bytes());
        Self {
            data: RawDirectoryEntry {
                used: 1,
                name: raw_name,
                first_block: first_block.to_le_bytes(),
                size: 0u32.to_le_bytes(),
            },
        }
    }

    pub fn is_used(&self) -> bool {
        self.data.used != 0
    }

    /// The stored name, up to the first NUL.
    ///
    /// A name filling the whole field (written by another tool) is returned as is.
    pub fn name_bytes(&self) -> &[u8] {
        let len = self
            .data
            .name
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(NAME_FIELD_LEN);
        &self.data.name[..len]
    }

    pub fn first_block(&self) -> Cluster {
        u16::from_le_bytes(self.data.first_block)
    }

    pub fn size(&self) -> u32 {
        u32::from_le_bytes(self.data.size)
    }

    pub fn write_size(&mut self, size: u32) {
        self.data.size = size.to_le_bytes();
    }

    pub fn info(&self) -> FileInfo {
        FileInfo {
            name: String::from_utf8_lossy(self.name_bytes()).into_owned(),
            size: self.size(),
        }
    }
}

/// The flat directory table
///
/// Slots are addressed by index; the index of a file never changes while it exists.
#[derive(Debug, Clone)]
pub struct Directory {
    entries: Vec<DirectoryEntry>,
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory {
    pub fn new() -> Self {
        Self {
            entries: vec![DirectoryEntry::zeroed(); DIR_SIZE],
        }
    }

    /// Reads the directory region of the device.
    pub fn load<D: DiskReader + ?Sized>(disk: &mut D) -> core::result::Result<Self, DiskError> {
        let mut directory = Self::new();
        let mut buffer = [0u8; SECTOR_SIZE];
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut directory.entries);
        for (index, chunk) in bytes.chunks_exact_mut(SECTOR_SIZE).enumerate() {
            disk.read_sector((FAT_SECTORS + index) as u32, &mut buffer)?;
            chunk.copy_from_slice(&buffer);
        }
        Ok(directory)
    }

    /// Writes the whole table back to the directory region.
    pub fn persist<D: DiskWriter + ?Sized>(
        &self,
        disk: &mut D,
    ) -> core::result::Result<(), DiskError> {
        let mut buffer = [0u8; SECTOR_SIZE];
        let bytes: &[u8] = bytemuck::cast_slice(&self.entries);
        debug_assert_eq!(bytes.len(), DIR_SECTORS * SECTOR_SIZE);
        for (index, chunk) in bytes.chunks_exact(SECTOR_SIZE).enumerate() {
            buffer.copy_from_slice(chunk);
            disk.write_sector((FAT_SECTORS + index) as u32, &buffer)?;
        }
        Ok(())
    }

    /// Marks every slot unused.
    pub fn clear(&mut self) {
        self.entries.fill(DirectoryEntry::zeroed());
    }

    pub fn get(&self, index: usize) -> Option<&DirectoryEntry> {
        self.entries.get(index).filter(|entry| entry.is_used())
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut DirectoryEntry> {
        self.entries.get_mut(index).filter(|entry| entry.is_used())
    }

    /// Finds the slot holding `name`, comparing bytes exactly.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.iter()
            .find_map(|(index, entry)| (entry.name_bytes() == name.as_bytes()).then_some(index))
    }

    pub fn has_free_slot(&self) -> bool {
        self.entries.iter().any(|slot| !slot.is_used())
    }

    /// Stores `entry` in the lowest unused slot.
    pub fn insert(&mut self, entry: DirectoryEntry) -> Option<usize> {
        let index = self.entries.iter().position(|slot| !slot.is_used())?;
        self.entries[index] = entry;
        Some(index)
    }

    /// Marks the slot unused and returns what it held.
    pub fn remove(&mut self, index: usize) -> Option<DirectoryEntry> {
        let entry = *self.get(index)?;
        self.entries[index] = DirectoryEntry::zeroed();
        Some(entry)
    }

    /// Puts a removed entry back into its old slot.
    pub fn restore(&mut self, index: usize, entry: DirectoryEntry) {
        if let Some(slot) = self.entries.get_mut(index) {
            *slot = entry;
        }
    }

    /// Used entries in table order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &DirectoryEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_used())
    }

    /// Sum of the sizes of every used entry.
    pub fn total_size(&self) -> u64 {
        self.iter().map(|(_, entry)| entry.size() as u64).sum()
    }
}
