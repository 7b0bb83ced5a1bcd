//! File I/O, abstracted behind a small trait for testability. Rust's own
//! `Drop` already gives every caller close-on-every-exit-path for free,
//! so the abstraction here is narrow: just the handful of operations
//! sessions actually need, plus a cleanup set that unlinks its paths when
//! the session ends, success or not.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use log::warn;

/// `open`/`size`/`remove`, the operations a session needs against real
/// paths. A mock implementation backs the unit tests in this module and
/// in `client`/`server` without touching the filesystem.
pub trait FileOps {
    fn open_read(&self, path: &Path) -> io::Result<File>;
    fn create(&self, path: &Path) -> io::Result<File>;
    fn size(&self, path: &Path) -> io::Result<u64>;
    fn remove(&self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RealFileOps;

impl FileOps for RealFileOps {
    fn open_read(&self, path: &Path) -> io::Result<File> {
        File::open(path)
    }

    fn create(&self, path: &Path) -> io::Result<File> {
        File::create(path)
    }

    fn size(&self, path: &Path) -> io::Result<u64> {
        fs::metadata(path).map(|m| m.len())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

/// Accumulates temporary paths created over the life of a session and
/// unlinks all of them when dropped, whether the session finished
/// cleanly or the caller bailed out early with `?`. "Not found" and
/// "is a directory" are logged, not propagated — the session is ending
/// either way.
pub struct CleanupGuard<'a> {
    ops: &'a dyn FileOps,
    paths: Vec<PathBuf>,
}

impl<'a> CleanupGuard<'a> {
    pub fn new(ops: &'a dyn FileOps) -> CleanupGuard<'a> {
        CleanupGuard {
            ops,
            paths: Vec::new(),
        }
    }

    pub fn track(&mut self, path: PathBuf) {
        self.paths.push(path);
    }
}

/// Linux/BSD `EISDIR`. `io::ErrorKind::IsADirectory` isn't stable yet, so
/// this falls back to the raw errno the way `remove_file()`'s docs
/// themselves suggest checking for it.
const EISDIR: i32 = 21;

impl<'a> Drop for CleanupGuard<'a> {
    fn drop(&mut self) {
        for path in &self.paths {
            match self.ops.remove(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) if e.raw_os_error() == Some(EISDIR) => {}
                Err(e) => warn!("failed to clean up {}: {}", path.display(), e),
            }
        }
    }
}
