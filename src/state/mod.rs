// State module
// File system layout and hashing for run outputs

pub mod storage;

pub use storage::{
    calculate_sha256, ensure_dir, file_sha256, OutputLayout, StorageError, StorageResult,
};
