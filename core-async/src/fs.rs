//! Async filesystem helpers re-exported from Tokio.
//!
//! Only the operations the storage adapters rely on are surfaced here.

pub use tokio::fs::{
    create_dir_all, metadata, read, read_dir, remove_file, rename, write, DirEntry, File,
    OpenOptions,
};
