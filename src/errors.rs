use std::error::Error;
use std::fmt;
use std::io;
use std::result;

/// Errors produced by a worker pool
#[derive(Debug)]
pub enum WorkerPoolError {
    /// The requested pool configuration is unusable (e.g. zero workers)
    InvalidConfiguration(String),
    /// The pool has been shut down and accepts no further work
    PoolClosed,
    /// A worker thread could not be spawned
    Io(io::Error),
    /// The pool's internal lock was poisoned
    LockError(String),
}

impl From<io::Error> for WorkerPoolError {
    fn from(err: io::Error) -> WorkerPoolError {
        WorkerPoolError::Io(err)
    }
}

impl fmt::Display for WorkerPoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerPoolError::InvalidConfiguration(reason) => {
                write!(f, "invalid pool configuration: {}", reason)
            }
            WorkerPoolError::PoolClosed => write!(f, "worker pool is closed"),
            WorkerPoolError::Io(err) => write!(f, "{}", err),
            WorkerPoolError::LockError(reason) => write!(f, "lock error: {}", reason),
        }
    }
}

impl Error for WorkerPoolError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WorkerPoolError::Io(err) => Some(err),
            WorkerPoolError::InvalidConfiguration(_) => None,
            WorkerPoolError::PoolClosed => None,
            WorkerPoolError::LockError(_) => None,
        }
    }
}

/// A worker pool result that wraps WorkerPoolError
pub type Result<T> = result::Result<T, WorkerPoolError>;
