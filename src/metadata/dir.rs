//! The File Table
//!
//! This isn't a tree.  Paths are flat strings, and "the contents of a directory" are simply the
//! entries whose path is the directory's path, a separator, and one more segment.
//!
//! On disk the table is a stream: a `u32` entry count, then for each entry its fixed size record,
//! a `u32` block count, and that many `u32` block numbers.
use std::{convert::TryFrom, io::Cursor};

use log::debug;

use crate::{
    block::BlockNumber,
    error::{OmniErrorKind, Result},
    metadata::{
        bounded,
        file::{FileEntry, FileRecord, FILE_RECORD_SIZE, PATH_CAPACITY},
    },
};

/// Path separator
pub(crate) const SEPARATOR: char = '/';

/// One entry in the file table, with the blocks that hold its content
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct TableEntry {
    pub(crate) entry: FileEntry,
    pub(crate) blocks: Vec<BlockNumber>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct FileTable {
    entries: Vec<TableEntry>,
}

impl FileTable {
    pub(crate) fn new() -> Self {
        FileTable {
            entries: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Position of the entry at exactly `path`
    pub(crate) fn position(&self, path: &str) -> Option<usize> {
        let path = bounded(path, PATH_CAPACITY);
        self.entries.iter().position(|e| e.entry.path == path)
    }

    pub(crate) fn get(&self, index: usize) -> Option<&TableEntry> {
        self.entries.get(index)
    }

    /// The regular file at exactly `path`
    pub(crate) fn find_file(&self, path: &str) -> Option<&TableEntry> {
        let path = bounded(path, PATH_CAPACITY);
        self.entries
            .iter()
            .find(|e| e.entry.is_file() && e.entry.path == path)
    }

    pub(crate) fn push(&mut self, entry: TableEntry) {
        self.entries.push(entry);
    }

    pub(crate) fn remove(&mut self, index: usize) -> TableEntry {
        self.entries.remove(index)
    }

    /// The next unused inode number
    pub(crate) fn next_inode(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| e.entry.inode)
            .max()
            .map_or(1, |n| n + 1)
    }

    /// Immediate children of `dir`, in table order
    pub(crate) fn children<'a>(&'a self, dir: &str) -> impl Iterator<Item = &'a TableEntry> + 'a {
        let mut prefix = dir.to_string();
        if !prefix.ends_with(SEPARATOR) {
            prefix.push(SEPARATOR);
        }

        self.entries.iter().filter(move |e| {
            e.entry
                .path
                .strip_prefix(prefix.as_str())
                .map_or(false, |rest| !rest.is_empty() && !rest.contains(SEPARATOR))
        })
    }

    /// Bytes taken on disk by one entry with `block_count` blocks
    pub(crate) fn entry_len(block_count: usize) -> u64 {
        FILE_RECORD_SIZE + 4 + 4 * block_count as u64
    }

    /// Bytes taken on disk by the whole table
    pub(crate) fn serialized_len(&self) -> u64 {
        4 + self
            .entries
            .iter()
            .map(|e| FileTable::entry_len(e.blocks.len()))
            .sum::<u64>()
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.serialized_len() as usize);

        bincode::serialize_into(&mut bytes, &(self.entries.len() as u32))?;
        for e in &self.entries {
            bincode::serialize_into(&mut bytes, &FileRecord::from(&e.entry))?;
            bincode::serialize_into(&mut bytes, &(e.blocks.len() as u32))?;
            for block in &e.blocks {
                bincode::serialize_into(&mut bytes, block)?;
            }
        }

        Ok(bytes)
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);

        let count: u32 = bincode::deserialize_from(&mut cursor)?;
        if u64::from(count) * FileTable::entry_len(0) > bytes.len() as u64 {
            // The count can't be right; there isn't room for that many records.
            return Err(OmniErrorKind::Io.into());
        }

        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let record: FileRecord = bincode::deserialize_from(&mut cursor)?;
            let entry = FileEntry::try_from(record)?;

            let block_count: u32 = bincode::deserialize_from(&mut cursor)?;
            let mut blocks = Vec::with_capacity(block_count.min(1024) as usize);
            for _ in 0..block_count {
                blocks.push(bincode::deserialize_from(&mut cursor)?);
            }

            entries.push(TableEntry { entry, blocks });
        }

        debug!("loaded file table with {} entries", entries.len());
        Ok(FileTable { entries })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::metadata::file::{EntryType, DIR_MODE, FILE_MODE};

    fn entry(path: &str, entry_type: EntryType, inode: u64, blocks: Vec<BlockNumber>) -> TableEntry {
        TableEntry {
            entry: FileEntry {
                path: path.to_string(),
                entry_type,
                size: blocks.len() as u64 * 100,
                permissions: if entry_type == EntryType::File {
                    FILE_MODE
                } else {
                    DIR_MODE
                },
                created: 0,
                modified: 0,
                owner: "alice".to_string(),
                inode,
            },
            blocks,
        }
    }

    fn table() -> FileTable {
        let mut table = FileTable::new();
        table.push(entry("/docs", EntryType::Directory, 1, vec![]));
        table.push(entry("/docs/a.txt", EntryType::File, 2, vec![4, 9]));
        table.push(entry("/docs/deep/b.txt", EntryType::File, 3, vec![5]));
        table.push(entry("/top.txt", EntryType::File, 4, vec![6]));
        table.push(entry("/docs/c.txt", EntryType::File, 5, vec![]));
        table
    }

    #[test]
    fn stream_round_trip() {
        let table = table();
        let bytes = table.to_bytes().unwrap();
        assert_eq!(bytes.len() as u64, table.serialized_len());
        assert_eq!(&bytes[..4], &5u32.to_le_bytes());

        let loaded = FileTable::from_bytes(&bytes).unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn empty_region_is_an_empty_table() {
        let loaded = FileTable::from_bytes(&[0u8; 64]).unwrap();
        assert_eq!(loaded.len(), 0);
        assert_eq!(loaded.next_inode(), 1);
    }

    #[test]
    fn bogus_count_is_rejected() {
        let mut bytes = vec![0u8; 64];
        bytes[..4].copy_from_slice(&1000u32.to_le_bytes());
        assert!(FileTable::from_bytes(&bytes).is_err());
    }

    #[test]
    fn immediate_children_only() {
        let table = table();
        let names = table
            .children("/docs")
            .map(|e| e.entry.path.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["/docs/a.txt", "/docs/c.txt"]);

        let names = table
            .children("/")
            .map(|e| e.entry.path.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["/docs", "/top.txt"], "table order, not sorted");
    }

    #[test]
    fn find_file_skips_directories() {
        let table = table();
        assert!(table.find_file("/docs").is_none());
        assert_eq!(table.position("/docs"), Some(0));
        assert_eq!(table.find_file("/top.txt").unwrap().blocks, vec![6]);
        assert_eq!(table.next_inode(), 6);
    }
}
