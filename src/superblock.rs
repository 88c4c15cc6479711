//! Superblock and Container Layout
//!
//! The superblock sits at offset 0 and records where everything else lives.  All of the offsets
//! are worked out once, at format time, and never change:
//!
//! ```text
//! 0                 superblock (header_size bytes reserved)
//! header_size       user table: max_users slots of 128 bytes
//! free_map_offset   free-map: one byte per block
//! content_base      num_blocks blocks; the last file_table_blocks of them hold the file table
//! change_log_offset end of the container
//! ```
//!
//! A layout digest (SHA-256 over the layout parameters) is stored alongside, and a container
//! whose digest doesn't match is refused.
use std::convert::TryFrom;

use log::debug;
use serde_derive::{Deserialize, Serialize};

use crate::{
    block::BlockSize,
    config::FormatOptions,
    crypto::digest,
    error::{OmniErrorKind, Result},
    metadata::{read_fixed, user::USER_SLOT_SIZE, write_fixed},
    time::format_date,
};

/// Every container starts with these eight bytes
pub const MAGIC: [u8; 8] = *b"OMNIFS01";
/// On-disk format version, 1.0
pub const FORMAT_VERSION: u32 = 0x0001_0000;
/// Encoded size of the superblock record
pub const SUPERBLOCK_SIZE: u64 = 172;

/// Overflow means the parameters can't describe a real container
fn checked(value: Option<u64>) -> Result<u64> {
    value.ok_or_else(|| OmniErrorKind::InvalidConfig.into())
}

/// Where each region of a container starts
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Layout {
    pub(crate) total_size: u64,
    pub(crate) header_size: u64,
    pub(crate) block_size: BlockSize,
    pub(crate) max_users: u32,
    pub(crate) user_table_offset: u64,
    pub(crate) free_map_offset: u64,
    pub(crate) num_blocks: u64,
    pub(crate) content_base: u64,
    pub(crate) file_table_blocks: u64,
    pub(crate) file_state_storage_offset: u64,
    pub(crate) change_log_offset: u64,
}

impl Layout {
    /// Work out a layout from format parameters
    pub(crate) fn compute(opts: &FormatOptions) -> Result<Self> {
        if opts.total_size == 0
            || opts.block_size == 0
            || opts.max_users == 0
            || opts.file_table_blocks == 0
        {
            return Err(OmniErrorKind::InvalidConfig.into());
        }
        if opts.header_size < SUPERBLOCK_SIZE {
            return Err(OmniErrorKind::InvalidConfig.into());
        }

        let user_table_offset = opts.header_size;
        let user_table_size = u64::from(opts.max_users) * USER_SLOT_SIZE;
        let free_map_offset = checked(user_table_offset.checked_add(user_table_size))?;
        if free_map_offset >= opts.total_size {
            return Err(OmniErrorKind::InvalidConfig.into());
        }

        let num_blocks = (opts.total_size - free_map_offset) / opts.block_size;
        if num_blocks <= opts.file_table_blocks {
            return Err(OmniErrorKind::InvalidConfig.into());
        }
        // Block numbers are persisted as u32.
        if u32::try_from(num_blocks).is_err() {
            return Err(OmniErrorKind::InvalidConfig.into());
        }

        let content_base = free_map_offset + num_blocks;
        let content_size = checked(num_blocks.checked_mul(opts.block_size))?;
        let table_base = (num_blocks - opts.file_table_blocks) * opts.block_size;
        let layout = Layout {
            total_size: opts.total_size,
            header_size: opts.header_size,
            block_size: opts.block_size,
            max_users: opts.max_users,
            user_table_offset,
            free_map_offset,
            num_blocks,
            content_base,
            file_table_blocks: opts.file_table_blocks,
            file_state_storage_offset: checked(content_base.checked_add(table_base))?,
            change_log_offset: checked(content_base.checked_add(content_size))?,
        };

        for offset in &[
            layout.user_table_offset,
            layout.file_state_storage_offset,
            layout.change_log_offset,
        ] {
            if u32::try_from(*offset).is_err() {
                return Err(OmniErrorKind::InvalidConfig.into());
            }
        }

        Ok(layout)
    }

    /// Bytes in the user table
    pub(crate) fn user_table_size(&self) -> u64 {
        u64::from(self.max_users) * USER_SLOT_SIZE
    }

    /// Bytes available for the serialized file table
    pub(crate) fn file_table_capacity(&self) -> u64 {
        self.change_log_offset - self.file_state_storage_offset
    }

    /// First block of the file table region
    pub(crate) fn first_table_block(&self) -> u64 {
        self.num_blocks - self.file_table_blocks
    }

    /// Absolute offset of block `n`
    pub(crate) fn block_offset(&self, n: u64) -> u64 {
        self.content_base + n * self.block_size
    }

    /// The physical length of a container with this layout
    pub(crate) fn physical_len(&self) -> u64 {
        self.total_size.max(self.change_log_offset)
    }

    fn digest(&self) -> Result<[u8; 32]> {
        let params = bincode::serialize(&(
            self.total_size,
            self.header_size,
            self.block_size,
            self.user_table_offset as u32,
            self.max_users,
            self.file_state_storage_offset as u32,
            self.change_log_offset as u32,
        ))?;
        Ok(digest(&params))
    }
}

/// The container header, as stored at offset 0
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Superblock {
    magic: [u8; 8],
    version: u32,
    total_size: u64,
    header_size: u64,
    block_size: u64,
    label: [u8; 32],
    date: [u8; 16],
    layout_digest: [u8; 32],
    reserved: [u8; 32],
    format_time: u64,
    user_table_offset: u32,
    max_users: u32,
    file_state_storage_offset: u32,
    change_log_offset: u32,
}

impl Superblock {
    pub(crate) fn new(layout: &Layout, label: &str, format_time: u64) -> Result<Self> {
        let mut sb = Superblock {
            magic: MAGIC,
            version: FORMAT_VERSION,
            total_size: layout.total_size,
            header_size: layout.header_size,
            block_size: layout.block_size,
            label: [0; 32],
            date: [0; 16],
            layout_digest: layout.digest()?,
            reserved: [0; 32],
            format_time,
            user_table_offset: layout.user_table_offset as u32,
            max_users: layout.max_users,
            file_state_storage_offset: layout.file_state_storage_offset as u32,
            change_log_offset: layout.change_log_offset as u32,
        };
        write_fixed(label, &mut sb.label);
        write_fixed(&format_date(format_time), &mut sb.date);
        Ok(sb)
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode, and check the magic.  Layout checks happen in [Superblock::layout].
    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let sb: Superblock = bincode::deserialize(bytes)?;
        if sb.magic != MAGIC {
            debug!("bad magic: {:?}", sb.magic);
            return Err(OmniErrorKind::InvalidConfig.into());
        }
        Ok(sb)
    }

    /// Rebuild, and verify, the layout recorded here
    pub(crate) fn layout(&self) -> Result<Layout> {
        if self.block_size == 0 || self.header_size < SUPERBLOCK_SIZE {
            return Err(OmniErrorKind::InvalidConfig.into());
        }

        let user_table_offset = u64::from(self.user_table_offset);
        let free_map_offset = user_table_offset + u64::from(self.max_users) * USER_SLOT_SIZE;
        if free_map_offset >= self.total_size {
            return Err(OmniErrorKind::InvalidConfig.into());
        }
        let num_blocks = (self.total_size - free_map_offset) / self.block_size;
        let content_base = free_map_offset + num_blocks;
        let content_size = checked(num_blocks.checked_mul(self.block_size))?;
        let content_end = checked(content_base.checked_add(content_size))?;

        let file_state_storage_offset = u64::from(self.file_state_storage_offset);
        let change_log_offset = u64::from(self.change_log_offset);
        if change_log_offset != content_end
            || file_state_storage_offset < content_base
            || file_state_storage_offset >= change_log_offset
            || (change_log_offset - file_state_storage_offset) % self.block_size != 0
        {
            return Err(OmniErrorKind::InvalidConfig.into());
        }
        let file_table_blocks = (change_log_offset - file_state_storage_offset) / self.block_size;
        if file_table_blocks >= num_blocks {
            return Err(OmniErrorKind::InvalidConfig.into());
        }

        let layout = Layout {
            total_size: self.total_size,
            header_size: self.header_size,
            block_size: self.block_size,
            max_users: self.max_users,
            user_table_offset,
            free_map_offset,
            num_blocks,
            content_base,
            file_table_blocks,
            file_state_storage_offset,
            change_log_offset,
        };

        if layout.digest()? != self.layout_digest {
            debug!("layout digest mismatch");
            return Err(OmniErrorKind::InvalidConfig.into());
        }

        Ok(layout)
    }

    /// Format version
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Requested container size
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Bytes reserved for the superblock
    pub fn header_size(&self) -> u64 {
        self.header_size
    }

    /// Block size
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Volume label
    pub fn label(&self) -> String {
        read_fixed(&self.label)
    }

    /// Format date, `YYYY-MM-DD`
    pub fn format_date(&self) -> String {
        read_fixed(&self.date)
    }

    /// Format time, unix seconds
    pub fn format_time(&self) -> u64 {
        self.format_time
    }

    /// Offset of the user table
    pub fn user_table_offset(&self) -> u32 {
        self.user_table_offset
    }

    /// Number of user slots
    pub fn max_users(&self) -> u32 {
        self.max_users
    }

    /// Offset of the file table region
    pub fn file_state_storage_offset(&self) -> u32 {
        self.file_state_storage_offset
    }

    /// End of the file table region
    pub fn change_log_offset(&self) -> u32 {
        self.change_log_offset
    }

    /// SHA-256 over the layout parameters
    pub fn layout_digest(&self) -> &[u8; 32] {
        &self.layout_digest
    }
}
