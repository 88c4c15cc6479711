//! File-based Container Storage
//!
//! The whole container lives in a single regular file on the host.  Offsets in the container are
//! offsets in the file, so a hex dump of the file is a hex dump of the file system.
use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use log::{debug, trace};

use crate::{block::storage::ContainerStorage, error::Result};

/// File-backed container
///
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    file: File,
}

impl FileStore {
    /// Create (or truncate) the backing file
    ///
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path: PathBuf = path.as_ref().into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        debug!("created container file {:?}", path);

        Ok(FileStore { path, file })
    }

    /// Open an existing backing file for reading and writing
    ///
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path: PathBuf = path.as_ref().into();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        debug!("opened container file {:?}", path);

        Ok(FileStore { path, file })
    }

    /// Where this container lives on the host
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContainerStorage for FileStore {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        trace!("read {} bytes at 0x{:x}", buf.len(), offset);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        trace!("wrote {} bytes at 0x{:x}", data.len(), offset);
        Ok(())
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
