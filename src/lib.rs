#![deny(missing_docs)]

//! A fixed-size worker pool!

pub use errors::{Result, WorkerPoolError};
pub use worker_pool::WorkerPool;

mod errors;
mod worker_pool;
