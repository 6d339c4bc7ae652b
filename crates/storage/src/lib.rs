#![forbid(unsafe_code)]

pub mod json_dir;
pub mod repository;
pub mod sqlite;

pub use repository::{InMemoryRepository, SessionRecord, SessionRepository, Storage, StorageError};
