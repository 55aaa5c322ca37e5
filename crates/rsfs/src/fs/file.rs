//! Open-file table and per-handle cursors

use alloc::{boxed::Box, vec, vec::Vec};

use rsfs_io::{DiskReader, DiskWriter, SECTOR_SIZE, Sector};

use crate::{
    error::{FsError, Result},
    structures::{
        fat::{Cluster, Fat},
        raw::constants::{CLUSTER_SIZE, DIR_SIZE, SECTORS_PER_CLUSTER},
    },
};

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    Read,
    Write,
}

impl TryFrom<i32> for OpenMode {
    type Error = FsError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Self::Read),
            1 => Ok(Self::Write),
            _ => Err(FsError::InvalidMode),
        }
    }
}

/// An opaque token for an open file.
///
/// A handle stays valid until the file is closed. Reopening the same file yields a new
/// handle; the old one keeps failing with [`FsError::NotOpen`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle {
    slot: usize,
    generation: u32,
}

impl FileHandle {
    /// The directory slot of the file this handle refers to.
    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// Reads the sectors of `cluster` into `buffer`.
pub(crate) fn read_cluster<D: DiskReader + ?Sized>(
    disk: &mut D,
    cluster: Cluster,
    buffer: &mut [u8],
) -> Result<()> {
    debug_assert_eq!(buffer.len(), CLUSTER_SIZE);
    let first = cluster as u32 * SECTORS_PER_CLUSTER as u32;
    let mut sector: Sector = [0; SECTOR_SIZE];
    for (index, chunk) in buffer.chunks_exact_mut(SECTOR_SIZE).enumerate() {
        disk.read_sector(first + index as u32, &mut sector)?;
        chunk.copy_from_slice(&sector);
    }
    Ok(())
}

/// Writes `buffer` to the sectors of `cluster`.
pub(crate) fn write_cluster<D: DiskWriter + ?Sized>(
    disk: &mut D,
    cluster: Cluster,
    buffer: &[u8],
) -> Result<()> {
    debug_assert_eq!(buffer.len(), CLUSTER_SIZE);
    let first = cluster as u32 * SECTORS_PER_CLUSTER as u32;
    let mut sector: Sector = [0; SECTOR_SIZE];
    for (index, chunk) in buffer.chunks_exact(SECTOR_SIZE).enumerate() {
        sector.copy_from_slice(chunk);
        disk.write_sector(first + index as u32, &sector)?;
    }
    log::trace!("Flushed cluster {cluster}");
    Ok(())
}

/// Position of an open file.
///
/// `offset` is the byte offset inside `cluster`. It reaches `CLUSTER_SIZE` once the cluster
/// has been consumed; the next cluster is only loaded (or allocated) when a byte has to go
/// there, so a file never owns a trailing empty cluster.
pub(crate) struct Cursor {
    pub mode: OpenMode,
    pub cluster: Cluster,
    pub offset: usize,
    /// Absolute byte position in the file
    pub position: u32,
    /// Staging copy of `cluster`
    pub buffer: Box<[u8]>,
    /// Set when `buffer` holds bytes not yet on disk
    pub dirty: bool,
}

impl core::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Cursor")
            .field("mode", &self.mode)
            .field("cluster", &self.cluster)
            .field("offset", &self.offset)
            .field("position", &self.position)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl Cursor {
    fn new(mode: OpenMode, cluster: Cluster) -> Self {
        Self {
            mode,
            cluster,
            offset: 0,
            position: 0,
            buffer: vec![0u8; CLUSTER_SIZE].into_boxed_slice(),
            dirty: false,
        }
    }

    pub fn load<D: DiskReader + ?Sized>(&mut self, disk: &mut D) -> Result<()> {
        read_cluster(disk, self.cluster, &mut self.buffer)?;
        self.dirty = false;
        Ok(())
    }

    /// Writes the staging buffer out if it holds unwritten bytes.
    pub fn flush<D: DiskWriter + ?Sized>(&mut self, disk: &mut D) -> Result<()> {
        if self.dirty {
            write_cluster(disk, self.cluster, &self.buffer)?;
            self.dirty = false;
        }
        Ok(())
    }

    /// Copies bytes out of the file, stopping after `out.len()` bytes.
    ///
    /// The caller clips `out` to the logical end of file; running out of chain before that
    /// means the table disagrees with the recorded size.
    pub fn read<D: DiskReader + ?Sized>(
        &mut self,
        disk: &mut D,
        fat: &Fat,
        out: &mut [u8],
    ) -> Result<usize> {
        let mut read = 0;
        while read < out.len() {
            if self.offset == CLUSTER_SIZE {
                let next = fat
                    .next(self.cluster)?
                    .ok_or(FsError::ConsistencyViolation {
                        cluster: self.cluster,
                    })?;
                self.cluster = next;
                self.offset = 0;
                self.load(disk)?;
            }
            let len = (CLUSTER_SIZE - self.offset).min(out.len() - read);
            out[read..read + len].copy_from_slice(&self.buffer[self.offset..self.offset + len]);
            self.offset += len;
            self.position += len as u32;
            read += len;
        }
        Ok(read)
    }

    /// Copies `data` into the file at the cursor, appending clusters as they fill up.
    ///
    /// Always reports how many bytes were copied, along with the error that stopped the
    /// copy early if there was one.
    pub fn write<D: DiskWriter + ?Sized>(
        &mut self,
        disk: &mut D,
        fat: &mut Fat,
        data: &[u8],
    ) -> (usize, Result<()>) {
        let mut written = 0;
        while written < data.len() {
            if self.offset == CLUSTER_SIZE {
                if let Err(error) = self.flush(disk) {
                    return (written, Err(error));
                }
                match fat.append(self.cluster) {
                    Ok(Some(next)) => {
                        self.cluster = next;
                        self.offset = 0;
                        self.buffer.fill(0);
                    }
                    Ok(None) => return (written, Err(FsError::InsufficientSpace { written })),
                    Err(error) => return (written, Err(error)),
                }
            }
            let len = (CLUSTER_SIZE - self.offset).min(data.len() - written);
            self.buffer[self.offset..self.offset + len]
                .copy_from_slice(&data[written..written + len]);
            self.offset += len;
            self.position += len as u32;
            self.dirty = true;
            written += len;
        }
        (written, Ok(()))
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    cursor: Option<Cursor>,
}

/// One slot per directory entry, so a file has at most one open handle.
#[derive(Debug)]
pub(crate) struct OpenFiles {
    slots: Vec<Slot>,
}

impl OpenFiles {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(DIR_SIZE);
        slots.resize_with(DIR_SIZE, Slot::default);
        Self { slots }
    }

    pub fn is_open(&self, slot: usize) -> bool {
        self.slots
            .get(slot)
            .is_some_and(|slot| slot.cursor.is_some())
    }

    pub fn open(&mut self, slot: usize, mode: OpenMode, cluster: Cluster) -> Result<FileHandle> {
        let entry = self.slots.get_mut(slot).ok_or(FsError::NotFound)?;
        if entry.cursor.is_some() {
            return Err(FsError::AlreadyOpen);
        }
        entry.generation = entry.generation.wrapping_add(1);
        entry.cursor = Some(Cursor::new(mode, cluster));
        Ok(FileHandle {
            slot,
            generation: entry.generation,
        })
    }

    pub fn get(&self, handle: FileHandle) -> Result<&Cursor> {
        self.slots
            .get(handle.slot)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.cursor.as_ref())
            .ok_or(FsError::NotOpen)
    }

    pub fn get_mut(&mut self, handle: FileHandle) -> Result<&mut Cursor> {
        self.slots
            .get_mut(handle.slot)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.cursor.as_mut())
            .ok_or(FsError::NotOpen)
    }

    /// Releases the handle; it is invalid from now on.
    pub fn release(&mut self, handle: FileHandle) -> Result<Cursor> {
        self.get(handle)?;
        self.slots[handle.slot].cursor.take().ok_or(FsError::NotOpen)
    }

    /// Drops every open cursor without flushing.
    pub fn close_all(&mut self) {
        for slot in &mut self.slots {
            slot.cursor = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_mode_from_raw() {
        assert_eq!(OpenMode::try_from(0), Ok(OpenMode::Read));
        assert_eq!(OpenMode::try_from(1), Ok(OpenMode::Write));
        assert_eq!(OpenMode::try_from(2), Err(FsError::InvalidMode));
        assert_eq!(OpenMode::try_from(-1), Err(FsError::InvalidMode));
    }

    #[test]
    fn test_one_handle_per_slot() {
        let mut files = OpenFiles::new();
        let handle = files.open(3, OpenMode::Read, 33).unwrap();
        assert_eq!(handle.slot(), 3);
        assert!(files.is_open(3));
        assert_eq!(
            files.open(3, OpenMode::Write, 33).unwrap_err(),
            FsError::AlreadyOpen
        );
        files.release(handle).unwrap();
        assert!(!files.is_open(3));
        assert_eq!(files.release(handle).unwrap_err(), FsError::NotOpen);
    }

    #[test]
    fn test_stale_handle_is_rejected() {
        let mut files = OpenFiles::new();
        let first = files.open(0, OpenMode::Read, 33).unwrap();
        files.release(first).unwrap();
        let second = files.open(0, OpenMode::Read, 33).unwrap();
        assert_ne!(first, second);
        assert_eq!(files.get(first).unwrap_err(), FsError::NotOpen);
        assert!(files.get(second).is_ok());

        files.close_all();
        assert_eq!(files.get(second).unwrap_err(), FsError::NotOpen);
    }

    #[test]
    fn test_cursor_crosses_cluster_boundary() {
        let sectors = (40 * SECTORS_PER_CLUSTER) as u32;
        let mut disk = rsfs_io::image(sectors);
        let mut fat = Fat::new(40);
        fat.format();
        let head = fat.allocate_one().unwrap();

        let data: Vec<u8> = (0..CLUSTER_SIZE + 10).map(|i| i as u8).collect();
        let mut cursor = Cursor::new(OpenMode::Write, head);
        let (written, result) = cursor.write(&mut disk, &mut fat, &data);
        assert_eq!(written, data.len());
        assert!(result.is_ok());
        assert_eq!(cursor.offset, 10);
        cursor.flush(&mut disk).unwrap();
        assert_eq!(fat.chain(head).unwrap(), vec![head, head + 1]);

        let mut cursor = Cursor::new(OpenMode::Read, head);
        cursor.load(&mut disk).unwrap();
        let mut out = vec![0u8; data.len()];
        assert_eq!(cursor.read(&mut disk, &fat, &mut out).unwrap(), data.len());
        assert_eq!(out, data);
        assert_eq!(cursor.position as usize, data.len());
    }

    #[test]
    fn test_exact_cluster_write_allocates_nothing_extra() {
        let mut disk = rsfs_io::image((40 * SECTORS_PER_CLUSTER) as u32);
        let mut fat = Fat::new(40);
        fat.format();
        let head = fat.allocate_one().unwrap();
        let mut cursor = Cursor::new(OpenMode::Write, head);
        let (written, result) = cursor.write(&mut disk, &mut fat, &[0x5A; CLUSTER_SIZE]);
        assert_eq!(written, CLUSTER_SIZE);
        assert!(result.is_ok());
        assert_eq!(cursor.offset, CLUSTER_SIZE);
        assert_eq!(fat.chain(head).unwrap(), vec![head]);
    }
}
