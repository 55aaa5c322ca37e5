//! The in-memory allocation table
//!
//! The table is loaded once at mount time and mirrored back to the FAT region after every
//! mutating operation. Only sectors that changed since the last [`Fat::persist`] are written.

use alloc::{vec, vec::Vec};

use rsfs_io::{DiskError, DiskReader, DiskWriter, SECTOR_SIZE};

use crate::error::{FsError, Result};

use super::raw::{
    constants::{
        CLUSTER_END_OF_CHAIN, CLUSTER_FREE, CLUSTER_RESERVED_DIR, CLUSTER_RESERVED_FAT,
        DIR_CLUSTER, FAT_CLUSTERS, FAT_SECTORS, FAT_SIZE, FIRST_DATA_CLUSTER,
    },
    fat::{ClusterEntry, ENTRIES_PER_SECTOR},
};

/// Index of a cluster on the volume.
///
/// The table has exactly `u16::MAX + 1` entries, so every `Cluster` indexes it.
pub type Cluster = u16;

/// Which reserved region a cluster belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Fat,
    Directory,
}

/// A decoded allocation table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatEntry {
    Reserved(Region),
    Free,
    EndOfChain,
    Next(Cluster),
}

impl FatEntry {
    pub fn from_raw(raw: ClusterEntry) -> Self {
        match u16::from_le_bytes(raw) {
            CLUSTER_FREE => Self::Free,
            CLUSTER_END_OF_CHAIN => Self::EndOfChain,
            CLUSTER_RESERVED_FAT => Self::Reserved(Region::Fat),
            CLUSTER_RESERVED_DIR => Self::Reserved(Region::Directory),
            next => Self::Next(next),
        }
    }

    pub fn to_raw(self) -> ClusterEntry {
        let value = match self {
            Self::Free => CLUSTER_FREE,
            Self::EndOfChain => CLUSTER_END_OF_CHAIN,
            Self::Reserved(Region::Fat) => CLUSTER_RESERVED_FAT,
            Self::Reserved(Region::Directory) => CLUSTER_RESERVED_DIR,
            Self::Next(next) => next,
        };
        value.to_le_bytes()
    }
}

#[derive(Clone)]
pub struct Fat {
    entries: Vec<ClusterEntry>,
    /// One flag per FAT sector, set when the sector differs from the disk copy
    dirty: Vec<bool>,
    /// Clusters at or above this index do not exist on the device
    cluster_limit: usize,
}

impl core::fmt::Debug for Fat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Fat")
            .field("cluster_limit", &self.cluster_limit)
            .field("free_clusters", &self.free_clusters())
            .finish()
    }
}

impl Fat {
    /// Creates a zeroed (unformatted) table for a device with `cluster_count` clusters.
    pub fn new(cluster_count: usize) -> Self {
        Self {
            entries: vec![[0; 2]; FAT_SIZE],
            dirty: vec![false; FAT_SECTORS],
            cluster_limit: cluster_count.min(FAT_SIZE),
        }
    }

    /// Reads the FAT region of the device.
    pub fn load<D: DiskReader + ?Sized>(
        disk: &mut D,
        cluster_count: usize,
    ) -> core::result::Result<Self, DiskError> {
        let mut fat = Self::new(cluster_count);
        let mut buffer = [0u8; SECTOR_SIZE];
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut fat.entries);
        for (sector, chunk) in bytes.chunks_exact_mut(SECTOR_SIZE).enumerate() {
            disk.read_sector(sector as u32, &mut buffer)?;
            chunk.copy_from_slice(&buffer);
        }
        Ok(fat)
    }

    /// Writes every sector changed since the last call back to the FAT region.
    pub fn persist<D: DiskWriter + ?Sized>(
        &mut self,
        disk: &mut D,
    ) -> core::result::Result<(), DiskError> {
        let mut buffer = [0u8; SECTOR_SIZE];
        let bytes: &[u8] = bytemuck::cast_slice(&self.entries);
        for (sector, chunk) in bytes.chunks_exact(SECTOR_SIZE).enumerate() {
            if !self.dirty[sector] {
                continue;
            }
            buffer.copy_from_slice(chunk);
            disk.write_sector(sector as u32, &buffer)?;
            self.dirty[sector] = false;
        }
        Ok(())
    }

    /// Tags the reserved regions and marks every other cluster free.
    pub fn format(&mut self) {
        for cluster in 0..FAT_SIZE {
            let entry = if cluster < FAT_CLUSTERS {
                FatEntry::Reserved(Region::Fat)
            } else if cluster == DIR_CLUSTER {
                FatEntry::Reserved(Region::Directory)
            } else {
                FatEntry::Free
            };
            self.entries[cluster] = entry.to_raw();
        }
        self.dirty.fill(true);
    }

    /// Checks the reserved tags at the start of the table.
    pub fn is_formatted(&self) -> bool {
        (0..FAT_CLUSTERS)
            .all(|cluster| self.get(cluster as Cluster) == FatEntry::Reserved(Region::Fat))
            && self.get(DIR_CLUSTER as Cluster) == FatEntry::Reserved(Region::Directory)
    }

    pub fn get(&self, cluster: Cluster) -> FatEntry {
        FatEntry::from_raw(self.entries[cluster as usize])
    }

    fn set(&mut self, cluster: Cluster, entry: FatEntry) {
        let index = cluster as usize;
        self.entries[index] = entry.to_raw();
        self.dirty[index / ENTRIES_PER_SECTOR] = true;
    }

    /// Number of clusters that exist on the device, reserved ones included.
    pub fn cluster_limit(&self) -> usize {
        self.cluster_limit
    }

    /// Number of clusters that can hold file data.
    pub fn data_clusters(&self) -> usize {
        self.cluster_limit.saturating_sub(FIRST_DATA_CLUSTER)
    }

    /// Whether `cluster` is a data cluster that exists on the device.
    pub fn is_data_cluster(&self, cluster: Cluster) -> bool {
        (FIRST_DATA_CLUSTER..self.cluster_limit).contains(&(cluster as usize))
    }

    pub fn free_clusters(&self) -> usize {
        (FIRST_DATA_CLUSTER..self.cluster_limit)
            .filter(|&cluster| self.get(cluster as Cluster) == FatEntry::Free)
            .count()
    }

    /// Finds the lowest free data cluster and marks it as the end of a new chain.
    pub fn allocate_one(&mut self) -> Option<Cluster> {
        let cluster = (FIRST_DATA_CLUSTER..self.cluster_limit)
            .map(|cluster| cluster as Cluster)
            .find(|&cluster| self.get(cluster) == FatEntry::Free)?;
        self.set(cluster, FatEntry::EndOfChain);
        log::trace!("Allocated cluster {cluster}");
        Some(cluster)
    }

    /// Extends the chain ending at `tail` by one cluster.
    ///
    /// Returns `Ok(None)` when no cluster is free, leaving the table untouched.
    pub fn append(&mut self, tail: Cluster) -> Result<Option<Cluster>> {
        if !self.is_data_cluster(tail) || self.get(tail) != FatEntry::EndOfChain {
            return Err(FsError::ConsistencyViolation { cluster: tail });
        }
        let Some(cluster) = self.allocate_one() else {
            return Ok(None);
        };
        self.set(tail, FatEntry::Next(cluster));
        Ok(Some(cluster))
    }

    /// Returns the cluster following `cluster`, or `None` at the end of the chain.
    pub fn next(&self, cluster: Cluster) -> Result<Option<Cluster>> {
        match self.get(cluster) {
            FatEntry::EndOfChain => Ok(None),
            FatEntry::Next(next) if self.is_data_cluster(next) => Ok(Some(next)),
            _ => Err(FsError::ConsistencyViolation { cluster }),
        }
    }

    /// Collects the chain starting at `head`.
    ///
    /// The walk visits at most one cluster per data cluster on the device, so a cycle is
    /// reported instead of looping.
    pub fn chain(&self, head: Cluster) -> Result<Vec<Cluster>> {
        if !self.is_data_cluster(head) {
            return Err(FsError::ConsistencyViolation { cluster: head });
        }
        let mut chain = vec![head];
        let mut current = head;
        while let Some(next) = self.next(current)? {
            if chain.len() >= self.data_clusters() {
                return Err(FsError::ConsistencyViolation { cluster: next });
            }
            chain.push(next);
            current = next;
        }
        Ok(chain)
    }

    /// Marks every cluster of the chain starting at `head` free, `head` included, and
    /// returns the freed chain.
    ///
    /// The chain is validated before anything is changed.
    pub fn free_chain(&mut self, head: Cluster) -> Result<Vec<Cluster>> {
        let chain = self.chain(head)?;
        for &cluster in &chain {
            self.set(cluster, FatEntry::Free);
        }
        log::trace!("Freed {} clusters starting at {head}", chain.len());
        Ok(chain)
    }

    /// Marks a single cluster free without walking a chain.
    pub fn release(&mut self, cluster: Cluster) {
        self.set(cluster, FatEntry::Free);
    }

    /// Links `chain` back together in order, ending it at its last cluster.
    ///
    /// Used to undo [`Self::free_chain`] or [`Self::truncate`] with the chain collected
    /// before the change.
    pub fn relink(&mut self, chain: &[Cluster]) {
        for pair in chain.windows(2) {
            self.set(pair[0], FatEntry::Next(pair[1]));
        }
        if let Some(&tail) = chain.last() {
            self.set(tail, FatEntry::EndOfChain);
        }
    }

    /// Frees everything after `head` and makes `head` the end of its chain.
    pub fn truncate(&mut self, head: Cluster) -> Result<usize> {
        let chain = self.chain(head)?;
        for &cluster in &chain[1..] {
            self.set(cluster, FatEntry::Free);
        }
        self.set(head, FatEntry::EndOfChain);
        Ok(chain.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // 4 MiB device
    const CLUSTERS: usize = 1024;

    fn formatted() -> Fat {
        let mut fat = Fat::new(CLUSTERS);
        fat.format();
        fat
    }

    #[test]
    fn test_raw_round_trip() {
        assert_eq!(FatEntry::from_raw([1, 0]), FatEntry::Free);
        assert_eq!(FatEntry::from_raw([2, 0]), FatEntry::EndOfChain);
        assert_eq!(FatEntry::from_raw([3, 0]), FatEntry::Reserved(Region::Fat));
        assert_eq!(FatEntry::from_raw([4, 0]), FatEntry::Reserved(Region::Directory));
        assert_eq!(FatEntry::from_raw([0x34, 0x12]), FatEntry::Next(0x1234));
        assert_eq!(FatEntry::Next(0x1234).to_raw(), [0x34, 0x12]);
    }

    #[test]
    fn test_format() {
        let fat = formatted();
        assert!(fat.is_formatted());
        assert_eq!(fat.get(0), FatEntry::Reserved(Region::Fat));
        assert_eq!(fat.get(31), FatEntry::Reserved(Region::Fat));
        assert_eq!(fat.get(32), FatEntry::Reserved(Region::Directory));
        assert_eq!(fat.get(33), FatEntry::Free);
        assert_eq!(fat.get(u16::MAX), FatEntry::Free);
        assert_eq!(fat.free_clusters(), CLUSTERS - FIRST_DATA_CLUSTER);
        assert!(!Fat::new(CLUSTERS).is_formatted());
    }

    #[test]
    fn test_allocation_order() {
        let mut fat = formatted();
        assert_eq!(fat.allocate_one(), Some(33));
        assert_eq!(fat.allocate_one(), Some(34));
        assert_eq!(fat.allocate_one(), Some(35));
        fat.free_chain(34).unwrap();
        // The lowest free cluster is reused first
        assert_eq!(fat.allocate_one(), Some(34));
        assert_eq!(fat.allocate_one(), Some(36));
    }

    #[test]
    fn test_allocation_stops_at_device_end() {
        let mut fat = Fat::new(FIRST_DATA_CLUSTER + 2);
        fat.format();
        assert_eq!(fat.allocate_one(), Some(33));
        assert_eq!(fat.allocate_one(), Some(34));
        assert_eq!(fat.allocate_one(), None);
        assert_eq!(fat.append(34).unwrap(), None);
        assert_eq!(fat.get(34), FatEntry::EndOfChain);
    }

    #[test]
    fn test_append_and_free_chain() {
        let mut fat = formatted();
        let head = fat.allocate_one().unwrap();
        let other = fat.allocate_one().unwrap();
        let second = fat.append(head).unwrap().unwrap();
        let third = fat.append(second).unwrap().unwrap();
        assert_eq!((head, other, second, third), (33, 34, 35, 36));
        assert_eq!(fat.get(head), FatEntry::Next(second));
        assert_eq!(fat.chain(head).unwrap(), vec![33, 35, 36]);

        assert_eq!(fat.free_chain(head).unwrap(), vec![33, 35, 36]);
        assert_eq!(fat.get(33), FatEntry::Free);
        assert_eq!(fat.get(35), FatEntry::Free);
        assert_eq!(fat.get(36), FatEntry::Free);
        assert_eq!(fat.get(other), FatEntry::EndOfChain);
    }

    #[test]
    fn test_append_requires_chain_tail() {
        let mut fat = formatted();
        let head = fat.allocate_one().unwrap();
        fat.append(head).unwrap();
        assert_eq!(
            fat.append(head),
            Err(FsError::ConsistencyViolation { cluster: head })
        );
        assert_eq!(
            fat.append(40),
            Err(FsError::ConsistencyViolation { cluster: 40 })
        );
    }

    #[test]
    fn test_truncate() {
        let mut fat = formatted();
        let head = fat.allocate_one().unwrap();
        let mut tail = head;
        for _ in 0..4 {
            tail = fat.append(tail).unwrap().unwrap();
        }
        assert_eq!(fat.truncate(head).unwrap(), 4);
        assert_eq!(fat.chain(head).unwrap(), vec![head]);
        assert_eq!(fat.free_clusters(), CLUSTERS - FIRST_DATA_CLUSTER - 1);
    }

    #[test]
    fn test_relink_undoes_free_chain() {
        let mut fat = formatted();
        let head = fat.allocate_one().unwrap();
        let other = fat.allocate_one().unwrap();
        let second = fat.append(head).unwrap().unwrap();
        let chain = fat.free_chain(head).unwrap();
        fat.relink(&chain);
        assert_eq!(fat.chain(head).unwrap(), vec![head, second]);
        assert_eq!(fat.get(other), FatEntry::EndOfChain);

        fat.truncate(head).unwrap();
        fat.relink(&chain);
        assert_eq!(fat.chain(head).unwrap(), chain);
        assert_eq!(fat.free_clusters(), CLUSTERS - FIRST_DATA_CLUSTER - 3);
    }

    #[test]
    fn test_cycle_is_detected() {
        let mut fat = formatted();
        let head = fat.allocate_one().unwrap();
        let second = fat.append(head).unwrap().unwrap();
        fat.set(second, FatEntry::Next(head));
        assert!(matches!(
            fat.chain(head),
            Err(FsError::ConsistencyViolation { .. })
        ));
        // Nothing is freed when the walk fails
        assert!(fat.free_chain(head).is_err());
        assert_eq!(fat.get(head), FatEntry::Next(second));
    }

    #[test]
    fn test_out_of_range_pointer_is_detected() {
        let mut fat = formatted();
        let head = fat.allocate_one().unwrap();
        fat.set(head, FatEntry::Next(CLUSTERS as Cluster + 5));
        assert_eq!(
            fat.chain(head),
            Err(FsError::ConsistencyViolation { cluster: head })
        );
        fat.set(head, FatEntry::Next(10));
        assert!(fat.free_chain(head).is_err());
    }

    #[test]
    fn test_persist_only_dirty_sectors() {
        let mut disk = rsfs_io::image(FAT_SECTORS as u32);
        let mut fat = formatted();
        fat.persist(&mut disk).unwrap();
        let loaded = Fat::load(&mut disk, CLUSTERS).unwrap();
        assert!(loaded.is_formatted());

        // Scribble over the last FAT sector, then touch only the first data sector entries
        disk[(FAT_SECTORS - 1) * SECTOR_SIZE] = 0xAA;
        fat.allocate_one();
        fat.persist(&mut disk).unwrap();
        assert_eq!(disk[(FAT_SECTORS - 1) * SECTOR_SIZE], 0xAA);
        let loaded = Fat::load(&mut disk, CLUSTERS).unwrap();
        assert_eq!(loaded.get(33), FatEntry::EndOfChain);
    }
}
