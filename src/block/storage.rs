pub mod file;
pub mod memory;

use crate::error::Result;

/// Persistent Storage for a Container
///
/// This trait is an abstraction for the bytes underneath the file system.  A container is one
/// contiguous, fixed-layout run of bytes; an implementor maps byte offsets to _some_ storage
/// location and is able to read and write at those offsets.
///
/// Reads are exact: a read that cannot fill the whole buffer is an error, never a short read.
pub trait ContainerStorage {
    /// Read `buf.len()` bytes starting at `offset`
    ///
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write all of `data` starting at `offset`
    ///
    /// Writing past the current end grows the container.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    /// Truncate or extend the container to exactly `len` bytes
    ///
    /// New bytes read as zero.
    fn set_len(&mut self, len: u64) -> Result<()>;

    /// Current length of the container, in bytes
    ///
    fn len(&self) -> Result<u64>;

    /// Flush buffered writes down to the backing medium
    ///
    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}
