//! Thread pools that the [`CatalogServer`] services connections on.
//!
//! [`CatalogServer`]: ../struct.CatalogServer.html
use crate::Result;

mod rayon_pool;
mod shared_queue;

pub use self::rayon_pool::RayonThreadPool;
pub use self::shared_queue::SharedQueueThreadPool;

/// A pool of worker threads that jobs can be handed to.
pub trait ThreadPool {
    /// creates a pool running `threads` worker threads
    ///
    /// # Errors
    /// returns an error if `threads` is zero or the worker threads could not be started
    fn new(threads: u32) -> Result<Self>
    where
        Self: Sized;

    /// runs `job` on one of the pool's threads, without waiting for it to finish
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static;
}
