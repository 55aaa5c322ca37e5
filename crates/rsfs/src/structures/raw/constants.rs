//! Fixed geometry of an rsfs volume.
//!
//! ```text
//! sectors [0, 256)     FAT, 65536 entries of 2 bytes (clusters 0..32)
//! sectors [256, 264)   directory, 128 entries of 32 bytes (cluster 32)
//! sectors [264, ..)    file data, addressed through FAT chains
//! ```

pub use rsfs_io::SECTOR_SIZE;

/// Size of an allocation unit, in bytes.
pub const CLUSTER_SIZE: usize = 4096;
pub const SECTORS_PER_CLUSTER: usize = CLUSTER_SIZE / SECTOR_SIZE;

/// Number of entries in the allocation table.
pub const FAT_SIZE: usize = 65536;
pub const FAT_ENTRY_SIZE: usize = 2;
pub const FAT_SECTORS: usize = FAT_SIZE * FAT_ENTRY_SIZE / SECTOR_SIZE;
pub const FAT_CLUSTERS: usize = FAT_SIZE * FAT_ENTRY_SIZE / CLUSTER_SIZE;

/// Number of slots in the directory table.
pub const DIR_SIZE: usize = 128;
pub const DIR_ENTRY_SIZE: usize = 32;
pub const DIR_SECTORS: usize = CLUSTER_SIZE / SECTOR_SIZE;
pub const DIR_CLUSTER: usize = FAT_CLUSTERS;

/// The first cluster that can belong to a file.
pub const FIRST_DATA_CLUSTER: usize = DIR_CLUSTER + 1;
/// Sectors taken by the FAT and directory regions.
pub const RESERVED_SECTORS: usize = FAT_SECTORS + DIR_SECTORS;

/// Width of the name field in a directory entry.
pub const NAME_FIELD_LEN: usize = 25;
/// Longest accepted name; the last byte of the field is always a NUL terminator.
pub const MAX_NAME_LEN: usize = NAME_FIELD_LEN - 1;

pub const CLUSTER_FREE: u16 = 0x0001;
pub const CLUSTER_END_OF_CHAIN: u16 = 0x0002;
pub const CLUSTER_RESERVED_FAT: u16 = 0x0003;
pub const CLUSTER_RESERVED_DIR: u16 = 0x0004;

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::const_assert_eq;

    const_assert_eq!(SECTORS_PER_CLUSTER, 8);
    const_assert_eq!(FAT_SECTORS, 256);
    const_assert_eq!(FAT_CLUSTERS, 32);
    const_assert_eq!(DIR_SECTORS, 8);
    const_assert_eq!(DIR_SIZE * DIR_ENTRY_SIZE, CLUSTER_SIZE);
    const_assert_eq!(FIRST_DATA_CLUSTER, 33);
    const_assert_eq!(RESERVED_SECTORS, FIRST_DATA_CLUSTER * SECTORS_PER_CLUSTER);
}
