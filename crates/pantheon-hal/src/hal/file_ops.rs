//! File operations below the staging root.
//!
//! Writes into the target system are routed through the HAL like every other
//! world-touching operation, so pipeline tests can inspect them.

use crate::HalResult;
use std::path::Path;

pub trait FileOps {
    fn path_exists(&self, path: &Path) -> bool;

    fn create_dir_all(&self, path: &Path) -> HalResult<()>;

    fn read_to_string(&self, path: &Path) -> HalResult<String>;

    /// Create or truncate `path` with `contents`.
    fn write_file(&self, path: &Path, contents: &str) -> HalResult<()>;

    /// Append `contents` to `path`, creating it if needed.
    fn append_file(&self, path: &Path, contents: &str) -> HalResult<()>;

    fn copy_file(&self, src: &Path, dst: &Path) -> HalResult<()>;

    /// Recursively copy the directory `src` to `dst`.
    fn copy_tree(&self, src: &Path, dst: &Path) -> HalResult<()>;
}
