use thiserror::Error;

use crate::attr::Attribute;
use crate::registry::BoardId;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the host interface.
///
/// Register sequences themselves never fail; every variant here is either rejected input (no
/// hardware access was made) or a failure reported by the platform while attaching a board.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid buffer length {len} (expected {expected})")]
    InvalidBufferLength { len: usize, expected: usize },

    #[error("invalid value for {attr}: {reason}")]
    InvalidValue {
        attr: &'static str,
        reason: &'static str,
    },

    #[error("attribute {0} does not support this access")]
    PermissionDenied(Attribute),

    #[error("attribute {0} is not enabled on this board")]
    UnsupportedAttribute(Attribute),

    #[error("unknown attribute {0:?}")]
    UnknownAttribute(String),

    #[error("invalid board id {0:?}")]
    InvalidBoardId(String),

    #[error("board {0} is already attached")]
    AlreadyAttached(BoardId),

    #[error("board {0} is not attached")]
    NotAttached(BoardId),

    #[error("too many boards attached (limit {limit})")]
    TooManyBoards { limit: usize },

    #[error("board {0} is still referenced and cannot be released")]
    SessionBusy(BoardId),

    #[error("platform error on board {id}: {source}")]
    Platform {
        id: BoardId,
        #[source]
        source: PlatformError,
    },
}

impl Error {
    /// Returns true for errors caused by rejected caller input (the sysfs `-EINVAL` class).
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Error::InvalidBufferLength { .. } | Error::InvalidValue { .. }
        )
    }
}

/// Failure reported by a [`crate::registry::Platform`] while acquiring board resources.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("failed to map BAR0: {0}")]
    MapFailed(String),

    #[error("failed to request IRQ: {0}")]
    IrqRequestFailed(String),

    #[error("failed to register attribute {attr}: {reason}")]
    AttributeRegistration { attr: Attribute, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
