//! OMNIFS Errors
//!
//! Every storage engine operation returns one of these instead of panicking. The server maps the
//! [`OmniErrorKind`] to a short machine readable code for the wire.
use std::{
    fmt::{self, Display},
    io,
};

use failure::{Backtrace, Context, Fail};

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, OmniError>;

/// The error type for the storage engine
///
/// This wraps an [`OmniErrorKind`] in a `failure::Context`, so the underlying cause (an I/O error,
/// say) is kept around for logging.
#[derive(Debug)]
pub struct OmniError {
    inner: Context<OmniErrorKind>,
}

impl OmniError {
    /// What went wrong, in broad strokes
    pub fn kind(&self) -> OmniErrorKind {
        *self.inner.get_context()
    }

    /// The wire code for this error
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }
}

impl Fail for OmniError {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}

impl Display for OmniError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.inner.cause() {
            Some(cause) => write!(f, "{}: {}", self.inner, cause),
            None => Display::fmt(&self.inner, f),
        }
    }
}

/// Error taxonomy
#[derive(Copy, Clone, Eq, PartialEq, Debug, Fail)]
pub enum OmniErrorKind {
    /// Bad format parameters, or a container that isn't ours
    #[fail(display = "invalid container configuration")]
    InvalidConfig,
    /// Create, seek, read, or write failed
    #[fail(display = "i/o error")]
    Io,
    /// Unknown user or path
    #[fail(display = "not found")]
    NotFound,
    /// Role or ownership check failed, or the password was wrong
    #[fail(display = "permission denied")]
    PermissionDenied,
    /// No free user slot, not enough free blocks, or the file table region is full
    #[fail(display = "no space left in container")]
    NoSpace,
    /// A required argument was missing or empty
    #[fail(display = "invalid operation")]
    InvalidOperation,
    /// The session token does not resolve
    #[fail(display = "invalid session")]
    InvalidSession,
    /// A user or path with that name already exists
    #[fail(display = "already exists")]
    AlreadyExists,
}

impl OmniErrorKind {
    /// Stable, machine readable code used in `error` responses
    pub fn code(self) -> &'static str {
        match self {
            OmniErrorKind::InvalidConfig => "invalid_config",
            OmniErrorKind::Io => "io_error",
            OmniErrorKind::NotFound => "not_found",
            OmniErrorKind::PermissionDenied => "permission_denied",
            OmniErrorKind::NoSpace => "no_space",
            OmniErrorKind::InvalidOperation => "invalid_operation",
            OmniErrorKind::InvalidSession => "invalid_session",
            OmniErrorKind::AlreadyExists => "already_exists",
        }
    }
}

impl From<OmniErrorKind> for OmniError {
    fn from(kind: OmniErrorKind) -> Self {
        OmniError {
            inner: Context::new(kind),
        }
    }
}

impl From<Context<OmniErrorKind>> for OmniError {
    fn from(inner: Context<OmniErrorKind>) -> Self {
        OmniError { inner }
    }
}

impl From<io::Error> for OmniError {
    fn from(e: io::Error) -> Self {
        e.context(OmniErrorKind::Io).into()
    }
}

impl From<bincode::Error> for OmniError {
    fn from(e: bincode::Error) -> Self {
        e.context(OmniErrorKind::Io).into()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn io_errors_keep_their_cause() {
        let e: OmniError = io::Error::new(io::ErrorKind::UnexpectedEof, "short read").into();
        assert_eq!(e.kind(), OmniErrorKind::Io);
        assert_eq!(e.code(), "io_error");
        assert!(format!("{}", e).contains("short read"));
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(OmniErrorKind::NoSpace.code(), "no_space");
        assert_eq!(OmniErrorKind::InvalidSession.code(), "invalid_session");
        let e: OmniError = OmniErrorKind::PermissionDenied.into();
        assert_eq!(e.code(), "permission_denied");
    }
}
