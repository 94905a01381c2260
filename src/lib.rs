#![deny(missing_docs)]
//! A persistent book catalog that assigns every new book a sequential, human readable
//! identifier such as `IRO-2025-000042`.
//!
//! This crate provides the identifier [`Allocator`], the [`Catalog`] that uses it when books
//! are added, two storage engines, as well as a [`shelf-client`] and [`shelf-server`]
//! executable that can be used to work with a catalog over the network.
//!
//! ## Identifier allocation
//! Identifiers are a namespace prefix (`{tag}-{year}-`) followed by a number zero padded to a
//! fixed width (6 by default). The allocator keeps no counter. For every new book it:
//!
//! 1. finds the greatest identifier stored under the prefix and takes the number after it
//! 2. formats the candidate identifier
//! 3. checks that no record holds the candidate, and if one does, backs off and starts over
//!
//! After `max_attempts` taken candidates (10 by default) the allocation fails with
//! [`ShelfError::AllocationExhausted`]. Numbers that outgrow the width are written in full
//! rather than truncated.
//!
//! Steps 1 to 3 and the following insert are not atomic, so every [`CatalogEngine`] enforces
//! key uniqueness when inserting. When two writers race for the same identifier, the loser's
//! insert fails with [`ShelfError::DuplicateKey`] and the [`Catalog`] reruns allocation and
//! insert a bounded number of times.
//!
//! ## Storage engines
//! - [`KvStore`] keeps records in "command log" files in a working directory, with an
//!   in-memory ordered index of where each key's latest value lives. Stale log data is
//!   compacted once it passes 1 MB.
//! - [`SledCatalogEngine`] stores records in a [`sled`] database.
//!
//! ## Client / Server
//! [`CatalogClient`] and [`CatalogServer`] exchange [`Request`] and [`Response`] values
//! encoded as JSON over a TCP stream. Failed requests come back as `Response::Err` carrying an
//! [`ErrorKind`], so clients can tell identifier contention (`Unavailable`) apart from
//! missing books or bad input.
//!
//! [`sled`]: https://docs.rs/sled/latest/sled/
//! [`shelf-server`]: ./shelf-server.rs
//! [`shelf-client`]: ./shelf-client.rs

pub use allocator::{probe, resolve_next, Allocator, AllocatorConfig, Backoff, SequenceStore};
pub use catalog::{Book, Catalog, CatalogConfig, NewBook};
pub use client::CatalogClient;
pub use command::{Request, Response};
pub use engine::{CatalogEngine, KvStore, SledCatalogEngine};
pub use error::{ErrorKind, Result, ShelfError};
pub use identifier::{format_identifier, parse_suffix, SequenceNamespace};
pub use server::CatalogServer;
pub use thread_pool::{RayonThreadPool, SharedQueueThreadPool, ThreadPool};

pub mod allocator;
pub mod catalog;
mod client;
mod command;
mod engine;
mod error;
pub mod identifier;
mod server;
pub mod thread_pool;
