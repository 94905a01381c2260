use serde::{Deserialize, Serialize};

use crate::catalog::{Book, NewBook};
use crate::error::{ErrorKind, ShelfError};

/// These are the request "commands" that can be made to a catalog server
#[derive(Debug, Serialize, Deserialize)]
pub enum Request {
    /// add a book under a newly allocated identifier of the current year
    Create {
        /// the book to add
        book: NewBook,
    },
    /// get a book by identifier
    Get {
        /// the identifier to search for
        id: String,
    },
    /// replace the record of an existing book
    Update {
        /// the new record, its `id` must already exist
        book: Book,
    },
    /// remove a book from the catalog
    Remove {
        /// the identifier to remove
        id: String,
    },
    /// list the books whose identifier starts with a prefix
    List {
        /// the identifier prefix, for example `IRO-2025-`
        prefix: String,
    },
    /// preview the next free identifier under a prefix, without reserving it
    Allocate {
        /// the namespace prefix, for example `IRO-2025-`
        prefix: String,
    },
}

/// The Response Types that can be returned for any catalog [`Request`]
#[derive(Debug, Serialize, Deserialize)]
pub enum Response {
    /// a single book
    Book(Book),
    /// a list of books, in identifier order
    Books(Vec<Book>),
    /// an identifier
    Id(String),
    /// the request succeeded and has nothing to return
    Ok,
    /// the requested book does not exist
    NotFound,
    /// this variant is returned if an Error occurs while processing the request
    Err {
        /// the class of error, so clients can tell contention from bad input
        kind: ErrorKind,
        /// a description of the error
        message: String,
    },
}

impl From<ShelfError> for Response {
    fn from(e: ShelfError) -> Self {
        Response::Err {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}
