//! File and Directory Entries
//!
use std::convert::TryFrom;

use serde_big_array::BigArray;
use serde_derive::{Deserialize, Serialize};

use crate::{
    error::{OmniError, OmniErrorKind},
    metadata::{read_fixed, write_fixed},
};

/// Encoded size of one entry record, not counting its block list
pub(crate) const FILE_RECORD_SIZE: u64 = 328;
pub(crate) const PATH_CAPACITY: usize = 256;
pub(crate) const OWNER_CAPACITY: usize = 32;

/// Permission bits given to new files
pub(crate) const FILE_MODE: u32 = 0o644;
/// Permission bits given to new directories
pub(crate) const DIR_MODE: u32 = 0o755;

/// A file, or a directory
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntryType {
    /// Has content, stored in blocks
    File,
    /// Zero size; exists so that it shows up in listings
    Directory,
}

impl EntryType {
    /// On-disk (and on-wire) tag
    pub fn as_u32(self) -> u32 {
        match self {
            EntryType::File => 0,
            EntryType::Directory => 1,
        }
    }
}

impl TryFrom<u32> for EntryType {
    type Error = OmniError;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        match n {
            0 => Ok(EntryType::File),
            1 => Ok(EntryType::Directory),
            _ => Err(OmniErrorKind::Io.into()),
        }
    }
}

/// Metadata for one entry in the file table
///
/// This is a value: what callers get back is a copy, and changing it changes nothing on disk.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileEntry {
    /// Full, flat path, e.g. `/docs/a.txt`
    pub path: String,
    /// File or Directory
    pub entry_type: EntryType,
    /// Content length in bytes
    pub size: u64,
    /// Unix style permission bits
    pub permissions: u32,
    /// Unix seconds
    pub created: u64,
    /// Unix seconds
    pub modified: u64,
    /// Username of the creator; empty if created without a session
    pub owner: String,
    /// Sequence number, unique within the container
    pub inode: u64,
}

impl FileEntry {
    /// Is this a regular file?
    pub fn is_file(&self) -> bool {
        self.entry_type == EntryType::File
    }

    /// Is this a directory?
    pub fn is_dir(&self) -> bool {
        self.entry_type == EntryType::Directory
    }
}

/// The fixed width, on-disk shape of a [FileEntry]
#[derive(Deserialize, Serialize)]
pub(crate) struct FileRecord {
    #[serde(with = "BigArray")]
    path: [u8; PATH_CAPACITY],
    entry_type: u32,
    size: u64,
    permissions: u32,
    created: u64,
    modified: u64,
    owner: [u8; OWNER_CAPACITY],
    inode: u64,
}

impl From<&FileEntry> for FileRecord {
    fn from(entry: &FileEntry) -> Self {
        let mut record = FileRecord {
            path: [0; PATH_CAPACITY],
            entry_type: entry.entry_type.as_u32(),
            size: entry.size,
            permissions: entry.permissions,
            created: entry.created,
            modified: entry.modified,
            owner: [0; OWNER_CAPACITY],
            inode: entry.inode,
        };
        write_fixed(&entry.path, &mut record.path);
        write_fixed(&entry.owner, &mut record.owner);
        record
    }
}

impl TryFrom<FileRecord> for FileEntry {
    type Error = OmniError;

    fn try_from(record: FileRecord) -> Result<Self, Self::Error> {
        Ok(FileEntry {
            path: read_fixed(&record.path),
            entry_type: EntryType::try_from(record.entry_type)?,
            size: record.size,
            permissions: record.permissions,
            created: record.created,
            modified: record.modified,
            owner: read_fixed(&record.owner),
            inode: record.inode,
        })
    }
}
