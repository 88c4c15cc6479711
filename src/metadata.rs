//! File System Metadata
//!
//! Two tables describe what lives in a container: the user table, a dense array of fixed size
//! slots right after the superblock, and the file table, a count-prefixed stream of entries in
//! the reserved tail of the block region.  Both are loaded whole when the container is mounted,
//! mutated in memory, and written back whole.
//!
//! Names, paths and owners are stored in fixed width, NUL terminated fields.  A value that doesn't
//! fit is cut to at most `capacity - 1` bytes, on a UTF-8 character boundary.  Lookups cut their
//! key the same way, so a long name still finds the record it was stored as.
pub(crate) mod dir;
pub(crate) mod file;
pub(crate) mod permissions;
pub(crate) mod user;

pub use self::{
    file::{EntryType, FileEntry},
    user::{UserInfo, UserRole},
};

/// Cut `value` so it fits, with its terminator, in a field of `capacity` bytes
pub(crate) fn bounded(value: &str, capacity: usize) -> &str {
    let max = capacity.saturating_sub(1);
    if value.len() <= max {
        return value;
    }

    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Store `value` into a fixed width field, zero filling the remainder
pub(crate) fn write_fixed(value: &str, field: &mut [u8]) {
    for b in field.iter_mut() {
        *b = 0;
    }
    let value = bounded(value, field.len());
    field[..value.len()].copy_from_slice(value.as_bytes());
}

/// Read a NUL terminated fixed width field
pub(crate) fn read_fixed(field: &[u8]) -> String {
    let end = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn short_values_are_untouched() {
        let mut field = [0xffu8; 8];
        write_fixed("abc", &mut field);
        assert_eq!(&field, b"abc\0\0\0\0\0");
        assert_eq!(read_fixed(&field), "abc");
    }

    #[test]
    fn long_values_keep_a_terminator() {
        let mut field = [0u8; 4];
        write_fixed("abcdef", &mut field);
        assert_eq!(&field, b"abc\0");
        assert_eq!(read_fixed(&field), "abc");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // 'é' is two bytes; cutting at 3 would split it.
        assert_eq!(bounded("aéb", 3), "a");
        assert_eq!(bounded("aéb", 4), "aé");
        assert_eq!(bounded("", 0), "");
    }
}
