//! Collision-free output naming.
//!
//! The resolver maps a desired title to a filesystem-safe path inside the
//! output directory. Issued names are recorded in memory for the lifetime
//! of the process and seeded from the output directory at startup, so a
//! restart never overwrites prior output.

mod resolver;

pub use resolver::FilenameResolver;

use thiserror::Error;

/// Errors that can occur while resolving an output name.
#[derive(Debug, Error)]
pub enum NamingError {
    /// The resolved name cannot be represented on the target filesystem.
    #[error("filesystem rejected name: {reason}")]
    FilesystemRejected { reason: String },
}
