use super::constants::NAME_FIELD_LEN;

/// A directory slot, as stored in the directory region.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RawDirectoryEntry {
    /// Non-zero when the slot holds a file
    pub used: u8,
    /// The name of the file, NUL padded
    pub name: [u8; NAME_FIELD_LEN],
    /// The first cluster of the file's chain
    pub first_block: [u8; 2],
    /// The size of the file, in bytes
    pub size: [u8; 4],
}

#[cfg(test)]
mod tests {
    use super::{super::constants::SECTOR_SIZE, *};
    use core::mem::{align_of, offset_of, size_of};
    use static_assertions::const_assert_eq;

    const_assert_eq!(size_of::<RawDirectoryEntry>(), super::super::constants::DIR_ENTRY_SIZE);
    const_assert_eq!(align_of::<RawDirectoryEntry>(), 1);

    const_assert_eq!(offset_of!(RawDirectoryEntry, used), 0);
    const_assert_eq!(offset_of!(RawDirectoryEntry, name), 1);
    const_assert_eq!(offset_of!(RawDirectoryEntry, first_block), 26);
    const_assert_eq!(offset_of!(RawDirectoryEntry, size), 28);

    // Entries never straddle a sector
    const_assert_eq!(SECTOR_SIZE % size_of::<RawDirectoryEntry>(), 0);
}
