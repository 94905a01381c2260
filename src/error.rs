use serde::{Deserialize, Serialize};
use thiserror::Error;

/// type alias for all operations on a shelf catalog that could fail with a [`ShelfError`]
pub type Result<T> = std::result::Result<T, ShelfError>;

/// The Error variants used throughout the shelf catalog.
///
/// Storage faults (`Io`, `Serde`, `Sled`) are propagated as soon as they happen and are never
/// retried by the allocator. Only uniqueness conflicts are retried, and running out of
/// attempts is reported as [`ShelfError::AllocationExhausted`].
#[derive(Debug, Error)]
pub enum ShelfError {
    /// variant for errors caused from file or socket IO
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// a log record, book record or wire message could not be (de)serialized
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// error reported by the sled storage engine
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// a key was not found in the catalog
    #[error("Key not found")]
    KeyNotFound,

    /// an insert was rejected because the key is already taken
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// every candidate tried within the retry budget was already taken
    #[error("identifier allocation exhausted for prefix {prefix} after {attempts} attempts")]
    AllocationExhausted {
        /// the namespace prefix that was being allocated from
        prefix: String,
        /// how many resolve/probe cycles were made
        attempts: u32,
    },

    /// a stored identifier does not carry a numeric suffix after its prefix.
    ///
    /// For a prefix chosen by a client, this usually means the prefix is not a namespace of its
    /// own, see [`Catalog::peek_next_id_for`](crate::Catalog::peek_next_id_for).
    #[error("stored identifier has a non-numeric suffix: {0}")]
    CorruptIdentifier(String),

    /// a command line argument or config value could not be parsed
    #[error("parsing error: {0}")]
    Parsing(String),

    /// a request or wire message was invalid
    #[error("invalid command: {0}")]
    Command(String),

    /// the server's own state is broken: a corrupt log, unreadable stored bytes or a poisoned lock
    #[error("internal error: {0}")]
    Internal(String),

    /// an error that happened on the server, relayed to a client
    #[error("{kind:?}: {message}")]
    Remote {
        /// the class of the server side error
        kind: ErrorKind,
        /// the server's description of the error
        message: String,
    },
}

/// Coarse classes of errors as reported to remote clients.
///
/// `Unavailable` means the request was fine but the catalog is contended, and the same
/// request may succeed later.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// identifier space contention: exhausted allocation or a persistent duplicate key
    Unavailable,
    /// the requested book does not exist
    NotFound,
    /// the request itself was malformed
    BadRequest,
    /// any other server side fault
    Internal,
}

impl ShelfError {
    /// classifies this error for reporting over the wire
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShelfError::AllocationExhausted { .. } | ShelfError::DuplicateKey(_) => {
                ErrorKind::Unavailable
            }
            ShelfError::KeyNotFound => ErrorKind::NotFound,
            ShelfError::Parsing(_) | ShelfError::Command(_) => ErrorKind::BadRequest,
            ShelfError::Remote { kind, .. } => *kind,
            _ => ErrorKind::Internal,
        }
    }
}
