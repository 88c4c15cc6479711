//! The Storage Engine
//!
//! An [OmniFileSystem] is one mounted container.  It owns the bytes underneath (some
//! [ContainerStorage]), and in-memory copies of the user table, the free-map, and the file table.
//!
//! Mutations are made in memory first and then written through: user creation persists the user
//! table, and file operations persist the free-map and the file table before returning.  Anything
//! left over (login times, mostly) is written back on [OmniFileSystem::unmount].  There's no
//! journal, so a failure part way through a write-back leaves the earlier writes in place.
//!
//! Every mutating operation takes `&mut self`.  Whoever holds the instance is the only writer.
use std::path::Path;

use log::{debug, error, info, trace, warn};
use serde_derive::Serialize;

use crate::{
    block::{
        blocks_needed,
        map::FreeMap,
        storage::{file::FileStore, memory::MemoryStore, ContainerStorage},
        BlockNumber,
    },
    config::FormatOptions,
    crypto::hash_password,
    error::{OmniErrorKind, Result},
    metadata::{
        bounded,
        dir::{FileTable, TableEntry},
        file::{EntryType, FileEntry, DIR_MODE, FILE_MODE, OWNER_CAPACITY, PATH_CAPACITY},
        permissions::{check_access, may_access},
        user::{UserInfo, UserRole, UserTable, USERNAME_CAPACITY},
    },
    session::{Session, SessionManager},
    superblock::{Layout, Superblock, SUPERBLOCK_SIZE},
    time::unix_now,
};

/// A summary of the container's state
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FsStat {
    /// Bytes per block
    pub block_size: u64,
    /// Blocks in the content region, including the file table's
    pub block_count: u64,
    /// Blocks available for file content
    pub free_blocks: u64,
    /// Blocks set aside for the file table
    pub reserved_blocks: u64,
    /// User slots
    pub max_users: u32,
    /// Occupied user slots
    pub active_users: u32,
    /// Files and directories
    pub entries: u64,
}

/// A mounted OMNIFS container
pub struct OmniFileSystem<S: ContainerStorage> {
    store: S,
    superblock: Superblock,
    layout: Layout,
    users: UserTable,
    free_map: FreeMap,
    files: FileTable,
    sessions: SessionManager,
    dirty: bool,
}

impl OmniFileSystem<FileStore> {
    /// Format a new container file
    ///
    /// Any existing file at `path` is truncated.
    pub fn format<P: AsRef<Path>>(path: P, opts: &FormatOptions) -> Result<()> {
        let store = FileStore::create(path.as_ref())?;
        OmniFileSystem::format_store(store, opts)?;
        Ok(())
    }

    /// Mount an existing container file
    pub fn mount<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = FileStore::open(path.as_ref())?;
        OmniFileSystem::mount_store(store)
    }
}

impl OmniFileSystem<MemoryStore> {
    /// Format and mount a container that lives in memory
    ///
    /// Good for tests, and for anything that should vanish with the process.
    pub fn new_memory(opts: &FormatOptions) -> Result<Self> {
        let store = OmniFileSystem::format_store(MemoryStore::new(), opts)?;
        OmniFileSystem::mount_store(store)
    }
}

impl<S: ContainerStorage> OmniFileSystem<S> {
    /// Lay down a fresh container on `store`, and hand the store back
    pub fn format_store(mut store: S, opts: &FormatOptions) -> Result<S> {
        let layout = Layout::compute(opts)?;
        let superblock = Superblock::new(&layout, &opts.label, unix_now())?;

        store.set_len(0)?;
        store.set_len(layout.physical_len())?;

        store.write_at(0, &superblock.to_bytes()?)?;
        store.write_at(
            layout.user_table_offset,
            &UserTable::new(layout.max_users as usize).to_bytes()?,
        )?;

        let mut free_map = FreeMap::new(layout.num_blocks as usize);
        free_map.reserve(
            layout.first_table_block() as usize,
            layout.file_table_blocks as usize,
        );
        store.write_at(layout.free_map_offset, free_map.as_bytes())?;
        store.write_at(
            layout.file_state_storage_offset,
            &FileTable::new().to_bytes()?,
        )?;
        store.sync()?;

        info!(
            "formatted container: {} blocks of {} bytes, {} user slots",
            layout.num_blocks, layout.block_size, layout.max_users
        );
        Ok(store)
    }

    /// Mount a container that already lives on `store`
    pub fn mount_store(store: S) -> Result<Self> {
        let mut bytes = vec![0; SUPERBLOCK_SIZE as usize];
        store.read_at(0, &mut bytes)?;
        let superblock = Superblock::from_bytes(&bytes)?;
        let layout = superblock.layout()?;
        if store.len()? < layout.change_log_offset {
            error!("container is shorter than its layout says");
            return Err(OmniErrorKind::Io.into());
        }

        let mut bytes = vec![0; layout.user_table_size() as usize];
        store.read_at(layout.user_table_offset, &mut bytes)?;
        let users = UserTable::from_bytes(&bytes, layout.max_users as usize)?;

        let mut bytes = vec![0; layout.num_blocks as usize];
        store.read_at(layout.free_map_offset, &mut bytes)?;
        let free_map = FreeMap::from_bytes(bytes);

        let files = if layout.file_table_capacity() > 0 {
            let mut bytes = vec![0; layout.file_table_capacity() as usize];
            store.read_at(layout.file_state_storage_offset, &mut bytes)?;
            FileTable::from_bytes(&bytes)?
        } else {
            FileTable::new()
        };

        info!(
            "mounted container \"{}\": {} users, {} entries, {} of {} blocks free",
            superblock.label(),
            users.active_count(),
            files.len(),
            free_map.free_block_count(),
            layout.num_blocks
        );

        Ok(OmniFileSystem {
            store,
            superblock,
            layout,
            users,
            free_map,
            files,
            sessions: SessionManager::new(),
            dirty: false,
        })
    }

    /// Write everything back and close the container
    ///
    /// The first write-back error is returned.
    pub fn unmount(mut self) -> Result<()> {
        let result = self.flush();
        // Don't let Drop try again.
        self.dirty = false;
        match &result {
            Ok(_) => info!("unmounted container \"{}\"", self.superblock.label()),
            Err(e) => error!("unmount failed: {}", e),
        }
        result
    }

    /// The container header
    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    /// The storage underneath
    pub fn storage(&self) -> &S {
        &self.store
    }

    /// Block and user accounting
    pub fn stat(&self) -> FsStat {
        let reserved = self.layout.file_table_blocks;
        FsStat {
            block_size: self.layout.block_size,
            block_count: self.layout.num_blocks,
            free_blocks: self.free_map.free_block_count() as u64,
            reserved_blocks: reserved,
            max_users: self.layout.max_users,
            active_users: self.users.active_count() as u32,
            entries: self.files.len() as u64,
        }
    }

    /// Create a user
    ///
    /// With a session, that session must belong to an admin.  Without one, this only works while
    /// the user table is empty: the very first user needs no credentials.
    pub fn create_user(
        &mut self,
        session: Option<&Session>,
        username: &str,
        password: &str,
        role: UserRole,
    ) -> Result<UserInfo> {
        debug!("create_user: {} ({})", username, role);
        if username.is_empty() || password.is_empty() {
            return Err(OmniErrorKind::InvalidOperation.into());
        }

        match session {
            Some(s) if s.user().role != UserRole::Admin => {
                warn!("{} may not create users", s.user().username);
                return Err(OmniErrorKind::PermissionDenied.into());
            }
            Some(_) => (),
            None if self.users.any_active() => {
                warn!("bootstrap user creation refused; users already exist");
                return Err(OmniErrorKind::PermissionDenied.into());
            }
            None => (),
        }

        let username = bounded(username, USERNAME_CAPACITY);
        if self.users.find(username).is_some() {
            return Err(OmniErrorKind::AlreadyExists.into());
        }
        let slot = self
            .users
            .first_free_slot()
            .ok_or(OmniErrorKind::NoSpace)?;

        let created = unix_now();
        let hash = hash_password(username, password, created);
        self.users.activate(slot, username, hash, role, created)?;
        self.dirty = true;
        self.persist_users()?;

        info!("created {} user {} in slot {}", role, username, slot);
        self.users.info(slot).ok_or_else(|| OmniErrorKind::NotFound.into())
    }

    /// Check a password and start a session
    pub fn login(&mut self, username: &str, password: &str) -> Result<Session> {
        debug!("login: {}", username);
        if username.is_empty() {
            return Err(OmniErrorKind::InvalidOperation.into());
        }

        let slot = self
            .users
            .find(username)
            .ok_or(OmniErrorKind::NotFound)?;
        let mut info = self.users.info(slot).ok_or(OmniErrorKind::NotFound)?;
        let stored = self
            .users
            .password_hash(slot)
            .ok_or(OmniErrorKind::NotFound)?;

        if hash_password(&info.username, password, info.created_time) != *stored {
            warn!("bad password for {}", info.username);
            return Err(OmniErrorKind::PermissionDenied.into());
        }

        let now = unix_now();
        self.users.set_last_login(slot, now);
        self.dirty = true;
        info.last_login = now;

        Ok(self.sessions.login(info, slot))
    }

    /// Every active user; admins only
    pub fn list_users(&self, session: Option<&Session>) -> Result<Vec<UserInfo>> {
        match session {
            Some(s) if s.user().role == UserRole::Admin => Ok(self.users.active_users()),
            _ => Err(OmniErrorKind::PermissionDenied.into()),
        }
    }

    /// Turn a token back into its session
    pub fn resolve(&self, token: &str) -> Result<Session> {
        self.sessions.resolve(token)
    }

    /// Create a file holding `data`
    ///
    /// The owner is the session's user, or nobody at all if there is no session.
    pub fn file_create(
        &mut self,
        session: Option<&Session>,
        path: &str,
        data: &[u8],
    ) -> Result<FileEntry> {
        debug!("file_create: {}, {} bytes", path, data.len());
        self.check_new_path(path)?;

        let count = blocks_needed(data.len() as u64, self.layout.block_size) as usize;
        self.check_table_room(count)?;

        let blocks = self.free_map.allocate(count)?;
        if let Err(e) = self.write_blocks(&blocks, data) {
            error!("write to {} failed, releasing {} blocks: {}", path, count, e);
            self.free_map.release(&blocks);
            return Err(e);
        }

        let entry = self.new_entry(session, path, EntryType::File, data.len() as u64);
        self.files.push(TableEntry {
            entry: entry.clone(),
            blocks,
        });
        self.dirty = true;

        self.persist_free_map()?;
        self.persist_file_table()?;
        Ok(entry)
    }

    /// Read a whole file
    pub fn file_read(&self, session: Option<&Session>, path: &str) -> Result<Vec<u8>> {
        debug!("file_read: {}", path);
        let found = self.files.find_file(path).ok_or(OmniErrorKind::NotFound)?;
        check_access(session, &found.entry)?;

        let bs = self.layout.block_size;
        let size = found.entry.size;
        if (found.blocks.len() as u64) * bs < size {
            error!("{} is larger than its blocks", path);
            return Err(OmniErrorKind::Io.into());
        }

        let mut data = vec![0; size as usize];
        for (chunk, block) in data.chunks_mut(bs as usize).zip(found.blocks.iter()) {
            let offset = self.block_offset(*block)?;
            trace!("reading {} bytes of block {}", chunk.len(), block);
            self.store.read_at(offset, chunk)?;
        }

        Ok(data)
    }

    /// Delete a file, returning its blocks to the pool
    pub fn file_delete(&mut self, session: Option<&Session>, path: &str) -> Result<()> {
        debug!("file_delete: {}", path);
        let index = match self.files.position(path) {
            Some(n) => match self.files.get(n) {
                Some(e) if e.entry.is_file() => n,
                _ => return Err(OmniErrorKind::NotFound.into()),
            },
            None => return Err(OmniErrorKind::NotFound.into()),
        };
        if let Some(found) = self.files.get(index) {
            check_access(session, &found.entry)?;
        }

        let removed = self.files.remove(index);
        self.free_map.release(&removed.blocks);
        self.dirty = true;

        self.persist_free_map()?;
        self.persist_file_table()?;
        Ok(())
    }

    /// Is there a file at exactly `path`?
    ///
    /// There's no permission check; anyone may ask.
    pub fn file_exists(&self, path: &str) -> bool {
        self.files.find_file(path).is_some()
    }

    /// Create an (empty) directory entry
    pub fn dir_create(&mut self, session: Option<&Session>, path: &str) -> Result<FileEntry> {
        debug!("dir_create: {}", path);
        self.check_new_path(path)?;
        self.check_table_room(0)?;

        let entry = self.new_entry(session, path, EntryType::Directory, 0);
        self.files.push(TableEntry {
            entry: entry.clone(),
            blocks: Vec::new(),
        });
        self.dirty = true;

        self.persist_file_table()?;
        Ok(entry)
    }

    /// The immediate children of `path` that the session may see, in table order
    pub fn dir_list(&self, session: Option<&Session>, path: &str) -> Result<Vec<FileEntry>> {
        debug!("dir_list: {}", path);
        if path.is_empty() {
            return Err(OmniErrorKind::InvalidOperation.into());
        }
        if session.is_none() {
            return Err(OmniErrorKind::PermissionDenied.into());
        }

        Ok(self
            .files
            .children(path)
            .filter(|e| may_access(session, &e.entry))
            .map(|e| e.entry.clone())
            .collect())
    }

    fn check_new_path(&self, path: &str) -> Result<()> {
        if path.is_empty() {
            return Err(OmniErrorKind::InvalidOperation.into());
        }
        if self.files.position(path).is_some() {
            return Err(OmniErrorKind::AlreadyExists.into());
        }
        Ok(())
    }

    /// Would the file table still fit with one more entry of `block_count` blocks?
    fn check_table_room(&self, block_count: usize) -> Result<()> {
        let needed = self.files.serialized_len() + FileTable::entry_len(block_count);
        if needed > self.layout.file_table_capacity() {
            warn!(
                "file table full: need {} bytes, have {}",
                needed,
                self.layout.file_table_capacity()
            );
            return Err(OmniErrorKind::NoSpace.into());
        }
        Ok(())
    }

    fn new_entry(
        &self,
        session: Option<&Session>,
        path: &str,
        entry_type: EntryType,
        size: u64,
    ) -> FileEntry {
        let now = unix_now();
        let owner = session.map_or("", |s| bounded(&s.user().username, OWNER_CAPACITY));

        FileEntry {
            path: bounded(path, PATH_CAPACITY).to_string(),
            entry_type,
            size,
            permissions: match entry_type {
                EntryType::File => FILE_MODE,
                EntryType::Directory => DIR_MODE,
            },
            created: now,
            modified: now,
            owner: owner.to_string(),
            inode: self.files.next_inode(),
        }
    }

    fn block_offset(&self, block: BlockNumber) -> Result<u64> {
        if u64::from(block) >= self.layout.first_table_block() {
            error!("block {} is outside the content region", block);
            return Err(OmniErrorKind::Io.into());
        }
        Ok(self.layout.block_offset(u64::from(block)))
    }

    fn write_blocks(&mut self, blocks: &[BlockNumber], data: &[u8]) -> Result<()> {
        for (chunk, block) in data.chunks(self.layout.block_size as usize).zip(blocks) {
            let offset = self.block_offset(*block)?;
            trace!("writing {} bytes to block {}", chunk.len(), block);
            self.store.write_at(offset, chunk)?;
        }
        Ok(())
    }

    fn persist_users(&mut self) -> Result<()> {
        let bytes = self.users.to_bytes()?;
        self.store.write_at(self.layout.user_table_offset, &bytes)
    }

    fn persist_free_map(&mut self) -> Result<()> {
        self.store
            .write_at(self.layout.free_map_offset, self.free_map.as_bytes())
    }

    fn persist_file_table(&mut self) -> Result<()> {
        let bytes = self.files.to_bytes()?;
        if bytes.len() as u64 > self.layout.file_table_capacity() {
            return Err(OmniErrorKind::NoSpace.into());
        }
        self.store
            .write_at(self.layout.file_state_storage_offset, &bytes)
    }

    /// Write back the user table, the free-map, and the file table, in that order
    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        debug!("flushing container state");
        self.persist_users()?;
        self.persist_free_map()?;
        self.persist_file_table()?;
        self.store.sync()?;
        self.dirty = false;
        Ok(())
    }
}

impl<S: ContainerStorage> Drop for OmniFileSystem<S> {
    fn drop(&mut self) {
        if self.dirty {
            warn!("container dropped without unmount; writing back");
            if let Err(e) = self.flush() {
                error!("write-back on drop failed: {}", e);
            }
        }
    }
}
