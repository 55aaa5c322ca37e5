use alloc::{format, vec, vec::Vec};

use rsfs_io::Disk;

use crate::{
    error::{FsError, Result},
    structures::{
        directory::{Directory, DirectoryEntry, validate_name},
        fat::{Cluster, Fat},
        raw::constants::{CLUSTER_SIZE, RESERVED_SECTORS, SECTORS_PER_CLUSTER},
    },
};

#[cfg(feature = "tool")]
use crate::structures::{
    fat::FatEntry,
    raw::constants::{FAT_SIZE, FIRST_DATA_CLUSTER},
};

pub use crate::structures::directory::FileInfo;
pub use file::{FileHandle, OpenMode};

mod file;

use file::OpenFiles;

/// A mounted rsfs volume
///
/// The volume owns its device and keeps the allocation table, the directory and the
/// open-file table in memory. Every call that changes the allocation table or the
/// directory writes them back to the device before returning.
///
/// ```text
/// FAT        sectors [0, 256)
/// Directory  sectors [256, 264)
/// Data       sectors [264, ..), in clusters of 8 sectors
/// ```
///
/// # Example
/// ```
/// use rsfs::{OpenMode, Volume};
///
/// // 4 MiB device
/// let mut volume = Volume::new_formatted(rsfs::io::image(8192))?;
/// let file = volume.open("hello.txt", OpenMode::Write)?;
/// volume.write(file, b"Hello, world!")?;
/// volume.close(file)?;
///
/// let file = volume.open("hello.txt", OpenMode::Read)?;
/// assert_eq!(volume.read(file, 100)?, b"Hello, world!");
/// volume.close(file)?;
/// # Ok::<(), rsfs::FsError>(())
/// ```
pub struct Volume<D: Disk> {
    disk: D,
    fat: Fat,
    directory: Directory,
    files: OpenFiles,
    formatted: bool,
}

impl<D: Disk> core::fmt::Debug for Volume<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Volume")
            .field("formatted", &self.formatted)
            .field("fat", &self.fat)
            .field("files", &self.files)
            .finish()
    }
}

impl<D: Disk> Volume<D> {
    /// Loads the allocation table and the directory from `disk`.
    ///
    /// An unformatted device still mounts, but every operation other than
    /// [`Self::format`] fails with [`FsError::NotFormatted`].
    pub fn mount(mut disk: D) -> Result<Self> {
        let sectors = disk.sector_count();
        if (sectors as usize) < RESERVED_SECTORS + SECTORS_PER_CLUSTER {
            return Err(FsError::DeviceTooSmall { sectors });
        }
        let fat = Fat::load(&mut disk, sectors as usize / SECTORS_PER_CLUSTER)?;
        let directory = Directory::load(&mut disk)?;
        let formatted = fat.is_formatted();
        if formatted {
            log::debug!(
                "Mounted volume: {} data clusters, {} free",
                fat.data_clusters(),
                fat.free_clusters()
            );
        } else {
            log::warn!("Mounted device is not formatted");
        }

        Ok(Self {
            disk,
            fat,
            directory,
            files: OpenFiles::new(),
            formatted,
        })
    }

    /// Mounts `disk` and formats it.
    pub fn new_formatted(disk: D) -> Result<Self> {
        let mut volume = Self::mount(disk)?;
        volume.format()?;
        Ok(volume)
    }

    /// Writes an empty allocation table and directory.
    ///
    /// Any open handle is dropped without flushing.
    pub fn format(&mut self) -> Result<()> {
        self.files.close_all();
        self.fat.format();
        self.directory.clear();
        self.persist()?;
        self.formatted = true;
        log::debug!("Formatted volume with {} data clusters", self.fat.data_clusters());
        Ok(())
    }

    pub fn is_formatted(&self) -> bool {
        self.formatted
    }

    pub fn device(&self) -> &D {
        &self.disk
    }

    /// Gives the device back. Bytes still staged in open handles are discarded.
    pub fn into_inner(self) -> D {
        self.disk
    }

    fn ensure_formatted(&self) -> Result<()> {
        if self.formatted {
            Ok(())
        } else {
            Err(FsError::NotFormatted)
        }
    }

    fn persist(&mut self) -> Result<()> {
        self.fat.persist(&mut self.disk)?;
        self.directory.persist(&mut self.disk)?;
        Ok(())
    }

    fn free_bytes(&self) -> u64 {
        let usable = (self.fat.data_clusters() * CLUSTER_SIZE) as u64;
        usable.saturating_sub(self.directory.total_size())
    }

    /// Usable bytes minus the recorded size of every file.
    ///
    /// This is an estimate: the unused tail of each file's last cluster is counted as free.
    pub fn free_space(&self) -> Result<u64> {
        self.ensure_formatted()?;
        Ok(self.free_bytes())
    }

    /// Every file, in directory order.
    pub fn list(&self) -> Result<Vec<FileInfo>> {
        self.ensure_formatted()?;
        Ok(self.directory.iter().map(|(_, entry)| entry.info()).collect())
    }

    /// Renders the listing as `name\t\tsize\n` lines into `buffer`.
    ///
    /// Only whole lines are written; the listing stops at the first line that does not fit.
    /// Returns the number of bytes written.
    pub fn list_into(&self, buffer: &mut [u8]) -> Result<usize> {
        self.ensure_formatted()?;
        let mut written = 0;
        for (_, entry) in self.directory.iter() {
            let line = format!("{}\n", entry.info());
            let end = written + line.len();
            if end > buffer.len() {
                break;
            }
            buffer[written..end].copy_from_slice(line.as_bytes());
            written = end;
        }
        Ok(written)
    }

    pub fn stat(&self, name: &str) -> Result<FileInfo> {
        self.ensure_formatted()?;
        let index = self.directory.find(name).ok_or(FsError::NotFound)?;
        self.directory
            .get(index)
            .map(DirectoryEntry::info)
            .ok_or(FsError::NotFound)
    }

    /// Creates an empty file owning a single cluster and returns its directory slot.
    pub fn create(&mut self, name: &str) -> Result<usize> {
        self.ensure_formatted()?;
        self.create_entry(name)
    }

    fn create_entry(&mut self, name: &str) -> Result<usize> {
        validate_name(name)?;
        if self.directory.find(name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        if !self.directory.has_free_slot() {
            return Err(FsError::DirectoryFull);
        }
        let cluster = self
            .fat
            .allocate_one()
            .ok_or(FsError::InsufficientSpace { written: 0 })?;
        let Some(index) = self.directory.insert(DirectoryEntry::new(name, cluster)) else {
            self.fat.release(cluster);
            return Err(FsError::DirectoryFull);
        };
        if let Err(error) = self.persist() {
            self.directory.remove(index);
            self.fat.release(cluster);
            return Err(error);
        }
        log::debug!("Created {name} in slot {index} at cluster {cluster}");
        Ok(index)
    }

    /// Deletes a file and frees its whole chain.
    ///
    /// An open file cannot be removed; this fails with [`FsError::AlreadyOpen`].
    pub fn remove(&mut self, name: &str) -> Result<()> {
        self.ensure_formatted()?;
        let index = self.directory.find(name).ok_or(FsError::NotFound)?;
        if self.files.is_open(index) {
            return Err(FsError::AlreadyOpen);
        }
        let entry = *self.directory.get(index).ok_or(FsError::NotFound)?;
        let chain = self.fat.free_chain(entry.first_block())?;
        self.directory.remove(index);
        if let Err(error) = self.persist() {
            self.fat.relink(&chain);
            self.directory.restore(index, entry);
            return Err(error);
        }
        log::debug!("Removed {name}, {} clusters freed", chain.len());
        Ok(())
    }

    /// Opens a file.
    ///
    /// [`OpenMode::Write`] creates the file when it does not exist and truncates it when it
    /// does: everything after the first cluster is freed and the size drops to 0.
    pub fn open(&mut self, name: &str, mode: OpenMode) -> Result<FileHandle> {
        self.ensure_formatted()?;
        match mode {
            OpenMode::Read => {
                let index = self.directory.find(name).ok_or(FsError::NotFound)?;
                let head = self.first_block(index)?;
                let handle = self.files.open(index, mode, head)?;
                let cursor = self.files.get_mut(handle)?;
                if let Err(error) = cursor.load(&mut self.disk) {
                    self.files.release(handle)?;
                    return Err(error);
                }
                Ok(handle)
            }
            OpenMode::Write => {
                let index = match self.directory.find(name) {
                    Some(index) => {
                        if self.files.is_open(index) {
                            return Err(FsError::AlreadyOpen);
                        }
                        self.truncate(index)?;
                        log::debug!("Truncated {name}");
                        index
                    }
                    None => self.create_entry(name)?,
                };
                let head = self.first_block(index)?;
                self.files.open(index, mode, head)
            }
        }
    }

    /// Frees the chain after the first cluster and resets the size, undoing both if the
    /// tables cannot be written.
    fn truncate(&mut self, index: usize) -> Result<()> {
        let head = self.first_block(index)?;
        let chain = self.fat.chain(head)?;
        let size = self.directory.get(index).map_or(0, DirectoryEntry::size);
        self.fat.truncate(head)?;
        self.set_size(index, 0);
        if let Err(error) = self.persist() {
            self.fat.relink(&chain);
            self.set_size(index, size);
            return Err(error);
        }
        Ok(())
    }

    fn set_size(&mut self, index: usize, size: u32) {
        if let Some(entry) = self.directory.get_mut(index) {
            entry.write_size(size);
        }
    }

    fn first_block(&self, index: usize) -> Result<Cluster> {
        self.directory
            .get(index)
            .map(DirectoryEntry::first_block)
            .ok_or(FsError::NotFound)
    }

    /// Flushes pending bytes and releases the handle.
    ///
    /// If the flush fails the handle stays open so the close can be retried.
    pub fn close(&mut self, handle: FileHandle) -> Result<()> {
        self.ensure_formatted()?;
        let cursor = self.files.get_mut(handle)?;
        cursor.flush(&mut self.disk)?;
        self.files.release(handle)?;
        Ok(())
    }

    /// Bytes between the cursor and the end of the file.
    fn remaining(&self, handle: FileHandle) -> Result<usize> {
        let cursor = self.files.get(handle)?;
        let size = self
            .directory
            .get(handle.slot())
            .map(DirectoryEntry::size)
            .ok_or(FsError::NotOpen)?;
        Ok(size.saturating_sub(cursor.position) as usize)
    }

    /// Reads into `buffer`, returning how many bytes were read.
    ///
    /// Reading at the end of the file returns 0 and leaves the cursor where it is.
    pub fn read_into(&mut self, handle: FileHandle, buffer: &mut [u8]) -> Result<usize> {
        self.ensure_formatted()?;
        let len = buffer.len().min(self.remaining(handle)?);
        let cursor = self.files.get_mut(handle)?;
        if cursor.mode != OpenMode::Read {
            return Err(FsError::InvalidMode);
        }
        cursor.read(&mut self.disk, &self.fat, &mut buffer[..len])
    }

    /// Reads at most `length` bytes.
    pub fn read(&mut self, handle: FileHandle, length: usize) -> Result<Vec<u8>> {
        self.ensure_formatted()?;
        let mut buffer = vec![0u8; length.min(self.remaining(handle)?)];
        let read = self.read_into(handle, &mut buffer)?;
        buffer.truncate(read);
        Ok(buffer)
    }

    /// Appends `data` at the cursor, returning the number of bytes written.
    ///
    /// Fails without writing anything when [`Self::free_space`] is smaller than `data`. If
    /// the volume runs out of clusters part way, the bytes already copied are flushed and
    /// counted in the file size, and [`FsError::InsufficientSpace`] reports how many there were.
    pub fn write(&mut self, handle: FileHandle, data: &[u8]) -> Result<usize> {
        self.ensure_formatted()?;
        if self.files.get(handle)?.mode != OpenMode::Write {
            return Err(FsError::InvalidMode);
        }
        if data.is_empty() {
            return Ok(0);
        }
        let available = self.free_bytes();
        if data.len() as u64 > available {
            log::warn!(
                "Refusing to write {} bytes, only {available} available",
                data.len()
            );
            return Err(FsError::InsufficientSpace { written: 0 });
        }

        let cursor = self.files.get_mut(handle)?;
        let (written, outcome) = cursor.write(&mut self.disk, &mut self.fat, data);
        let flushed = match outcome {
            Ok(()) => Ok(()),
            Err(_) => cursor.flush(&mut self.disk),
        };
        if let Some(entry) = self.directory.get_mut(handle.slot()) {
            entry.write_size(entry.size() + written as u32);
        }
        self.persist()?;
        flushed?;
        if let Err(error) = outcome {
            log::warn!("Write stopped after {written} of {} bytes: {error}", data.len());
            return Err(error);
        }
        Ok(written)
    }
}

#[cfg(feature = "tool")]
impl<D: Disk> Volume<D> {
    /// Clusters of the file's chain, in order.
    pub fn chain(&self, name: &str) -> Result<Vec<Cluster>> {
        self.ensure_formatted()?;
        let index = self.directory.find(name).ok_or(FsError::NotFound)?;
        self.fat.chain(self.first_block(index)?)
    }

    /// Checks the allocation table against the directory.
    ///
    /// Every chain must end, stay inside the data region, be long enough for the file size and
    /// share no cluster with another chain. Every allocated cluster must belong to a chain.
    pub fn verify(&self) -> Result<()> {
        self.ensure_formatted()?;
        let mut owned = vec![false; FAT_SIZE];
        for (_, entry) in self.directory.iter() {
            let chain = self.fat.chain(entry.first_block())?;
            for &cluster in &chain {
                if core::mem::replace(&mut owned[cluster as usize], true) {
                    return Err(FsError::ConsistencyViolation { cluster });
                }
            }
            let needed = (entry.size() as usize).div_ceil(CLUSTER_SIZE).max(1);
            if chain.len() < needed {
                let cluster = chain.last().copied().unwrap_or(entry.first_block());
                return Err(FsError::ConsistencyViolation { cluster });
            }
        }
        for cluster in FIRST_DATA_CLUSTER..self.fat.cluster_limit() {
            let cluster = cluster as Cluster;
            if self.fat.get(cluster) != FatEntry::Free && !owned[cluster as usize] {
                return Err(FsError::ConsistencyViolation { cluster });
            }
        }
        Ok(())
    }
}
