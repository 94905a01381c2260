//! Book records and the entity creation path that assigns their identifiers.
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::allocator::{Allocator, AllocatorConfig};
use crate::engine::CatalogEngine;
use crate::identifier::{parse_suffix, SequenceNamespace, DEFAULT_WIDTH};
use crate::{Result, ShelfError};

/// default tag that book identifiers start with
pub const DEFAULT_TAG: &str = "IRO";

/// default number of allocate-and-insert rounds tried when the insert hits a duplicate key
pub const DEFAULT_INSERT_ATTEMPTS: u32 = 3;

// stored in place of a removed book's record
const TOMBSTONE: &str = "null";

/// A book held by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// the allocated identifier, also the storage key
    pub id: String,
    /// the book's title
    pub title: String,
    /// author names, in credit order
    #[serde(default)]
    pub authors: Vec<String>,
    /// the ISBN, if the book has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    /// the publishing house
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    /// the shelf category, such as "Fiction"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// the year the edition was published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_year: Option<i32>,
    /// copies owned by the library
    pub total_copies: u32,
    /// copies currently on the shelf
    pub available_copies: u32,
}

/// A book that has not been assigned an identifier yet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewBook {
    /// the book's title
    pub title: String,
    /// author names, in credit order
    #[serde(default)]
    pub authors: Vec<String>,
    /// the ISBN, if the book has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    /// the publishing house
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    /// the shelf category, such as "Fiction"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// the year the edition was published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_year: Option<i32>,
    /// copies the library is adding
    pub total_copies: u32,
}

impl NewBook {
    /// a single copy of a book called `title`
    pub fn titled(title: impl Into<String>) -> Self {
        NewBook {
            title: title.into(),
            total_copies: 1,
            ..NewBook::default()
        }
    }

    fn into_book(self, id: String) -> Book {
        Book {
            id,
            title: self.title,
            authors: self.authors,
            isbn: self.isbn,
            publisher: self.publisher,
            category: self.category,
            published_year: self.published_year,
            total_copies: self.total_copies,
            available_copies: self.total_copies,
        }
    }
}

/// Tunables of a [`Catalog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    /// the tag in front of every book identifier, as in `{tag}-{year}-000001`
    pub tag: String,
    /// digit width of the numeric suffix. Changing it for a year that already has books breaks
    /// the ordering the allocator depends on.
    pub width: usize,
    /// allocate-and-insert rounds before a duplicate key is given up on, 0 is treated as 1
    pub insert_attempts: u32,
    /// settings of the underlying [`Allocator`]
    pub allocator: AllocatorConfig,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            tag: DEFAULT_TAG.to_string(),
            width: DEFAULT_WIDTH,
            insert_attempts: DEFAULT_INSERT_ATTEMPTS,
            allocator: AllocatorConfig::default(),
        }
    }
}

/// The book catalog, storing [`Book`] records as JSON in a [`CatalogEngine`].
#[derive(Debug, Clone)]
pub struct Catalog<E: CatalogEngine> {
    engine: E,
    allocator: Allocator,
    config: CatalogConfig,
}

impl<E: CatalogEngine> Catalog<E> {
    /// creates a catalog over `engine` with the default configuration
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, CatalogConfig::default())
    }

    /// creates a catalog over `engine` using `config`
    pub fn with_config(engine: E, config: CatalogConfig) -> Self {
        Catalog {
            engine,
            allocator: Allocator::new(config.allocator),
            config,
        }
    }

    /// the storage engine behind this catalog
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// the namespace new books are numbered in: `{tag}-{current UTC year}-`
    pub fn current_namespace(&self) -> SequenceNamespace {
        SequenceNamespace::yearly(&self.config.tag, Utc::now().year(), self.config.width)
    }

    /// the namespace a `prefix` sent by a client is numbered in
    pub fn namespace_for(&self, prefix: &str) -> SequenceNamespace {
        SequenceNamespace::with_width(prefix, self.config.width)
    }

    /// adds `book` to the catalog under a freshly allocated identifier of the current year
    pub fn create_book(&self, book: NewBook) -> Result<Book> {
        let namespace = self.current_namespace();
        self.create_book_in(&namespace, book)
    }

    /// adds `book` to the catalog under a freshly allocated identifier in `namespace`.
    ///
    /// If the insert loses a race against a concurrent writer that took the same identifier,
    /// allocation and insert are redone, up to `insert_attempts` rounds.
    ///
    /// # Errors
    /// - [`ShelfError::AllocationExhausted`] from the allocator, nothing is inserted
    /// - [`ShelfError::DuplicateKey`] if every round lost its race
    #[instrument(skip(self, book), fields(title = %book.title))]
    pub fn create_book_in(&self, namespace: &SequenceNamespace, book: NewBook) -> Result<Book> {
        let rounds = self.config.insert_attempts.max(1);
        let mut last_conflict = None;
        for round in 1..=rounds {
            let id = self.allocator.allocate(&self.engine, namespace)?;
            let record = book.clone().into_book(id);
            let value = serde_json::to_string(&record)?;
            match self.engine.insert_new(record.id.clone(), value) {
                Ok(()) => {
                    info!(id = %record.id, "added book");
                    return Ok(record);
                }
                Err(ShelfError::DuplicateKey(id)) => {
                    debug!(%id, round, "insert lost a race for the identifier");
                    last_conflict = Some(id);
                }
                Err(e) => return Err(e),
            }
        }

        let id = last_conflict.unwrap_or_else(|| namespace.prefix().to_string());
        warn!(%id, rounds, "giving up on duplicate identifiers");
        Err(ShelfError::DuplicateKey(id))
    }

    /// returns the next identifier `namespace` would hand out, without reserving it
    pub fn peek_next_id(&self, namespace: &SequenceNamespace) -> Result<String> {
        self.allocator.allocate(&self.engine, namespace)
    }

    /// returns the next identifier a client supplied `prefix` would hand out, without reserving
    /// it.
    ///
    /// # Errors
    /// returns [`ShelfError::Parsing`] if `prefix` also covers identifiers of a longer namespace,
    /// as `IRO-` does for `IRO-2025-000001`
    pub fn peek_next_id_for(&self, prefix: &str) -> Result<String> {
        let namespace = self.namespace_for(prefix);
        match self.peek_next_id(&namespace) {
            Err(ShelfError::CorruptIdentifier(key)) if parse_suffix(&namespace, &key).is_none() => {
                Err(ShelfError::Parsing(format!(
                    "prefix {} is not a namespace of its own, it also covers {}",
                    prefix, key
                )))
            }
            other => other,
        }
    }

    /// returns the book with the given `id`, if there is one
    pub fn get_book(&self, id: &str) -> Result<Option<Book>> {
        match self.engine.get(id)? {
            Some(value) => Ok(serde_json::from_str::<Option<Book>>(&value)?),
            None => Ok(None),
        }
    }

    /// replaces the stored record of `book.id` with `book`
    ///
    /// # Errors
    /// returns [`ShelfError::KeyNotFound`] if no book has that id; identifiers are only ever
    /// assigned by [`create_book_in`](#method.create_book_in)
    pub fn update_book(&self, book: &Book) -> Result<()> {
        if self.get_book(&book.id)?.is_none() {
            return Err(ShelfError::KeyNotFound);
        }
        if book.available_copies > book.total_copies {
            return Err(ShelfError::Command(format!(
                "book {} has {} copies available out of {}",
                book.id, book.available_copies, book.total_copies
            )));
        }
        self.engine.set(book.id.clone(), serde_json::to_string(book)?)
    }

    /// removes the book with the given `id`.
    ///
    /// The record is replaced by a tombstone rather than deleted, so its identifier stays the
    /// greatest in its namespace if it was, and is never handed out again.
    ///
    /// # Errors
    /// returns [`ShelfError::KeyNotFound`] if no book has that id
    pub fn remove_book(&self, id: &str) -> Result<()> {
        if self.get_book(id)?.is_none() {
            return Err(ShelfError::KeyNotFound);
        }
        self.engine.set(id.to_string(), TOMBSTONE.to_string())?;
        info!(%id, "removed book");
        Ok(())
    }

    /// returns the books whose identifier starts with `prefix`, in identifier order
    pub fn list_books(&self, prefix: &str) -> Result<Vec<Book>> {
        let mut books = Vec::new();
        for (_, value) in self.engine.scan_prefix(prefix)? {
            if let Some(book) = serde_json::from_str::<Option<Book>>(&value)? {
                books.push(book);
            }
        }
        Ok(books)
    }
}
