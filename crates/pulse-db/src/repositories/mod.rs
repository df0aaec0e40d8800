//! Repository implementations
//!
//! PostgreSQL implementations of the collaborator traits defined in pulse-core.

mod directory;
mod error;

pub use directory::PgDirectory;
