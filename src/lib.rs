#![warn(missing_docs)]
//! OMNIFS: a small, authenticated file system in a single file
//!
//! A container is one fixed-layout host file: a superblock, a table of user slots, a one byte per
//! block free-map, and a run of blocks, the last few of which hold the file table.  Paths are flat
//! strings; "directories" are entries that other paths happen to be prefixed by.
//!
//! ```no_run
//! use omnifs::{FormatOptions, OmniFileSystem, UserRole};
//!
//! OmniFileSystem::format("/tmp/demo.omni", &FormatOptions::default())?;
//! let mut fs = OmniFileSystem::mount("/tmp/demo.omni")?;
//!
//! fs.create_user(None, "admin", "secret", UserRole::Admin)?;
//! let admin = fs.login("admin", "secret")?;
//! fs.file_create(Some(&admin), "/hello.txt", b"hello")?;
//! assert_eq!(fs.file_read(Some(&admin), "/hello.txt")?, b"hello");
//!
//! fs.unmount()?;
//! # Ok::<(), omnifs::OmniError>(())
//! ```
//!
//! [OmniServer] puts a mounted container on the network.
mod block;
mod config;
mod crypto;
mod error;
mod fsimpl;
mod metadata;
mod server;
mod session;
mod superblock;
mod time;

pub use crate::{
    block::{
        storage::{file::FileStore, memory::MemoryStore, ContainerStorage},
        BlockNumber, BlockSize,
    },
    config::{
        FormatOptions, ServerConfig, DEFAULT_BLOCK_SIZE, DEFAULT_FILE_TABLE_BLOCKS,
        DEFAULT_HEADER_SIZE, DEFAULT_MAX_USERS, DEFAULT_PORT, DEFAULT_TOTAL_SIZE,
    },
    error::{OmniError, OmniErrorKind, Result},
    fsimpl::{FsStat, OmniFileSystem},
    metadata::{EntryType, FileEntry, UserInfo, UserRole},
    server::{OmniServer, ServerHandle, Stopper},
    session::Session,
    superblock::{Superblock, FORMAT_VERSION, MAGIC, SUPERBLOCK_SIZE},
};
