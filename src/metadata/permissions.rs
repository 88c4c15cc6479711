//! Entry Access Rules
//!
//! Reading, deleting, and listing are gated on who is asking:
//!
//!  * no session at all: denied
//!  * an admin: allowed
//!  * anyone else: allowed only for entries whose owner is exactly their username
//!
//! The stored permission bits are reported but never consulted here.
use log::trace;

use crate::{
    error::{OmniErrorKind, Result},
    metadata::{file::FileEntry, user::UserRole},
    session::Session,
};

/// May `session` touch `entry`?
pub(crate) fn may_access(session: Option<&Session>, entry: &FileEntry) -> bool {
    match session {
        None => false,
        Some(s) if s.user().role == UserRole::Admin => true,
        Some(s) => entry.owner == s.user().username,
    }
}

/// [may_access], as an error
pub(crate) fn check_access(session: Option<&Session>, entry: &FileEntry) -> Result<()> {
    if may_access(session, entry) {
        Ok(())
    } else {
        trace!(
            "access to {} denied for {:?}",
            entry.path,
            session.map(|s| s.user().username.as_str())
        );
        Err(OmniErrorKind::PermissionDenied.into())
    }
}
