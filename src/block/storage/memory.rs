//! Memory-based Container Storage
//!
//! This is a toy that is useful for testing.  The container is a `Vec<u8>`.

use log::trace;

use crate::{
    block::storage::ContainerStorage,
    error::{OmniErrorKind, Result},
};

/// An in-memory [ContainerStorage]
///
/// This is a transient container.  It's certainly useful for tests and benches, and for the odd
/// ephemeral file system that should vanish with the process.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryStore {
    bytes: Vec<u8>,
}

impl MemoryStore {
    /// Create a new, empty MemoryStore
    ///
    pub fn new() -> Self {
        MemoryStore { bytes: Vec::new() }
    }

    /// The raw container bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl ContainerStorage for MemoryStore {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + buf.len();
        if end > self.bytes.len() {
            return Err(OmniErrorKind::Io.into());
        }
        buf.copy_from_slice(&self.bytes[start..end]);
        trace!("read {} bytes at 0x{:x}", buf.len(), offset);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + data.len();
        if end > self.bytes.len() {
            self.bytes.resize(end, 0);
        }
        self.bytes[start..end].copy_from_slice(data);
        trace!("wrote {} bytes at 0x{:x}", data.len(), offset);
        Ok(())
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        self.bytes.resize(len as usize, 0);
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.bytes.len() as u64)
    }
}
