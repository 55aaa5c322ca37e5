//! Raw allocation table entries
//!
//! Each cluster of the volume has one 2 byte entry. Values `1..=4` are tags
//! (free, end of chain, FAT region, directory region); anything else is the
//! index of the next cluster in the chain.

pub type ClusterEntry = [u8; 2];

/// Number of raw entries stored in a single sector.
pub const ENTRIES_PER_SECTOR: usize = super::constants::SECTOR_SIZE / size_of::<ClusterEntry>();
