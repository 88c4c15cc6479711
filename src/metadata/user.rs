//! User Table
//!
//! `max_users` fixed size slots.  A slot is never physically removed; inactive slots are simply
//! reused.  The in-memory [UserIndex] maps a username to its slot and is rebuilt from the active
//! slots on mount.

use std::{fmt, str::FromStr};

use log::{debug, warn};
use serde_derive::{Deserialize, Serialize};

use crate::{
    error::{OmniErrorKind, Result},
    metadata::{bounded, read_fixed, write_fixed},
};

/// Encoded size of one user slot
pub(crate) const USER_SLOT_SIZE: u64 = 128;
pub(crate) const USERNAME_CAPACITY: usize = 32;

/// What a user is allowed to do
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UserRole {
    /// May only touch entries it owns
    Normal,
    /// May touch anything, and may create other users
    Admin,
}

impl UserRole {
    /// On-disk (and on-wire) representation
    pub fn as_u32(self) -> u32 {
        match self {
            UserRole::Normal => 0,
            UserRole::Admin => 1,
        }
    }

    /// Anything other than `1` is a normal user
    pub fn from_u32(n: u32) -> Self {
        match n {
            1 => UserRole::Admin,
            _ => UserRole::Normal,
        }
    }
}

impl FromStr for UserRole {
    type Err = crate::error::OmniError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" | "1" => Ok(UserRole::Admin),
            "normal" | "user" | "0" | "" => Ok(UserRole::Normal),
            _ => Err(OmniErrorKind::InvalidOperation.into()),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UserRole::Normal => write!(f, "normal"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

/// A detached copy of a user record
///
/// The password hash never leaves the table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UserInfo {
    /// Login name
    pub username: String,
    /// Normal or Admin
    pub role: UserRole,
    /// Unix seconds
    pub created_time: u64,
    /// Unix seconds, zero if never logged in
    pub last_login: u64,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
struct UserSlot {
    username: [u8; 32],
    password_hash: [u8; 32],
    hash_tail: [u8; 32],
    role: u32,
    created_time: u64,
    last_login: u64,
    is_active: u8,
    reserved: [u8; 11],
}

impl UserSlot {
    fn is_active(&self) -> bool {
        self.is_active != 0
    }

    fn username(&self) -> String {
        read_fixed(&self.username)
    }

    fn info(&self) -> UserInfo {
        UserInfo {
            username: self.username(),
            role: UserRole::from_u32(self.role),
            created_time: self.created_time,
            last_login: self.last_login,
        }
    }
}

/// Username to slot index
///
/// Open addressing with linear probing.  The capacity is a power of two at least twice the number
/// of slots, so the table never fills in practice; even so, every probe sequence gives up after one
/// full cycle.
#[derive(Clone, Debug)]
pub(crate) struct UserIndex {
    buckets: Vec<Option<(String, usize)>>,
}

impl UserIndex {
    pub(crate) fn new(max_users: usize) -> Self {
        let mut capacity = 1;
        while capacity < max_users * 2 {
            capacity <<= 1;
        }
        UserIndex {
            buckets: vec![None; capacity],
        }
    }

    fn hash(key: &str) -> u64 {
        key.bytes().fold(5381u64, |h, b| {
            h.wrapping_shl(5).wrapping_add(h).wrapping_add(u64::from(b))
        })
    }

    fn home(&self, key: &str) -> usize {
        (UserIndex::hash(key) as usize) & (self.buckets.len() - 1)
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Insert or update; returns `false` only if the table is saturated
    pub(crate) fn insert(&mut self, key: &str, slot: usize) -> bool {
        let capacity = self.buckets.len();
        let mut idx = self.home(key);

        for _ in 0..capacity {
            let same_key = self.buckets[idx].as_ref().map(|(k, _)| k.as_str() == key);
            match same_key {
                Some(false) => idx = (idx + 1) & (capacity - 1),
                Some(true) | None => {
                    self.buckets[idx] = Some((key.to_string(), slot));
                    return true;
                }
            }
        }

        warn!("user index is saturated; unable to insert {}", key);
        false
    }

    pub(crate) fn find(&self, key: &str) -> Option<usize> {
        let capacity = self.buckets.len();
        let mut idx = self.home(key);

        for _ in 0..capacity {
            match &self.buckets[idx] {
                Some((k, v)) if k.as_str() == key => return Some(*v),
                Some(_) => idx = (idx + 1) & (capacity - 1),
                None => return None,
            }
        }
        None
    }
}

/// The whole user table, plus its index
#[derive(Clone, Debug)]
pub(crate) struct UserTable {
    slots: Vec<UserSlot>,
    index: UserIndex,
}

impl UserTable {
    pub(crate) fn new(max_users: usize) -> Self {
        UserTable {
            slots: vec![UserSlot::default(); max_users],
            index: UserIndex::new(max_users),
        }
    }

    /// Decode `max_users` slots and rebuild the index from the active ones
    pub(crate) fn from_bytes(bytes: &[u8], max_users: usize) -> Result<Self> {
        let mut table = UserTable::new(max_users);

        for (n, chunk) in bytes
            .chunks(USER_SLOT_SIZE as usize)
            .take(max_users)
            .enumerate()
        {
            let slot: UserSlot = bincode::deserialize(chunk)?;
            if slot.is_active() {
                table.index.insert(&slot.username(), n);
            }
            table.slots[n] = slot;
        }

        debug!(
            "loaded user table: {} of {} slots active",
            table.active_count(),
            max_users
        );
        Ok(table)
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.slots.len() * USER_SLOT_SIZE as usize);
        for slot in &self.slots {
            bincode::serialize_into(&mut bytes, slot)?;
        }
        Ok(bytes)
    }

    pub(crate) fn any_active(&self) -> bool {
        self.slots.iter().any(UserSlot::is_active)
    }

    pub(crate) fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_active()).count()
    }

    /// Slot of the active user called `username`
    pub(crate) fn find(&self, username: &str) -> Option<usize> {
        let username = bounded(username, USERNAME_CAPACITY);
        match self.index.find(username) {
            Some(n) => match self.slots.get(n) {
                Some(slot) if slot.is_active() && slot.username() == username => Some(n),
                _ => None,
            },
            None => None,
        }
    }

    pub(crate) fn first_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| !s.is_active())
    }

    /// Fill an inactive slot and index it
    pub(crate) fn activate(
        &mut self,
        n: usize,
        username: &str,
        password_hash: [u8; 32],
        role: UserRole,
        created_time: u64,
    ) -> Result<()> {
        let mut slot = UserSlot::default();
        write_fixed(username, &mut slot.username);
        slot.password_hash = password_hash;
        slot.role = role.as_u32();
        slot.created_time = created_time;
        slot.last_login = 0;
        slot.is_active = 1;

        let key = slot.username();
        match self.slots.get_mut(n) {
            Some(s) => *s = slot,
            None => return Err(OmniErrorKind::NoSpace.into()),
        }
        if !self.index.insert(&key, n) {
            return Err(OmniErrorKind::NoSpace.into());
        }
        Ok(())
    }

    pub(crate) fn info(&self, n: usize) -> Option<UserInfo> {
        self.slots.get(n).filter(|s| s.is_active()).map(UserSlot::info)
    }

    pub(crate) fn password_hash(&self, n: usize) -> Option<&[u8; 32]> {
        self.slots.get(n).map(|s| &s.password_hash)
    }

    pub(crate) fn set_last_login(&mut self, n: usize, time: u64) {
        if let Some(slot) = self.slots.get_mut(n) {
            slot.last_login = time;
        }
    }

    pub(crate) fn active_users(&self) -> Vec<UserInfo> {
        self.slots
            .iter()
            .filter(|s| s.is_active())
            .map(UserSlot::info)
            .collect()
    }
}
