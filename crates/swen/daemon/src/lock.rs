//! Exclusive ownership of a state directory.
//!
//! One process at a time may own the ticket pool and the logs under a
//! state directory. Ownership is an advisory `flock` on `swend.lock`,
//! released by the kernel when the process exits, so a crash never leaves
//! the directory locked. The owner's pid is written into the file for
//! error messages.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{DaemonError, DaemonResult};

/// Held for as long as the state directory is owned.
pub struct StateLock {
    path: PathBuf,
    #[cfg(unix)]
    _file: nix::fcntl::Flock<File>,
    #[cfg(not(unix))]
    _file: File,
}

impl StateLock {
    /// Take the lock without waiting. Fails with [`DaemonError::Locked`]
    /// when another process owns the directory.
    pub fn acquire(path: impl Into<PathBuf>) -> DaemonResult<Self> {
        let path = path.into();
        let file = Self::take(&path)?;
        {
            let mut handle: &File = &file;
            handle.set_len(0)?;
            writeln!(handle, "{}", std::process::id())?;
        }
        debug!(path = %path.display(), "Acquired state lock");
        Ok(Self { path, _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(unix)]
    fn take(path: &Path) -> DaemonResult<nix::fcntl::Flock<File>> {
        use nix::errno::Errno;
        use nix::fcntl::{Flock, FlockArg};

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => Ok(lock),
            Err((_, Errno::EWOULDBLOCK)) => Err(DaemonError::Locked {
                path: path.to_path_buf(),
                holder: read_holder(path),
            }),
            Err((_, errno)) => Err(DaemonError::Io(errno.into())),
        }
    }

    #[cfg(not(unix))]
    fn take(path: &Path) -> DaemonResult<File> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(DaemonError::Locked {
                path: path.to_path_buf(),
                holder: read_holder(path),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for StateLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateLock").field("path", &self.path).finish()
    }
}

#[cfg(not(unix))]
impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn read_holder(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swend.lock");

        let held = StateLock::acquire(&path).unwrap();
        match StateLock::acquire(&path) {
            Err(DaemonError::Locked { holder, .. }) => {
                assert_eq!(holder, Some(std::process::id()));
            }
            other => panic!("expected Locked, got {:?}", other),
        }

        drop(held);
        assert!(StateLock::acquire(&path).is_ok());
    }
}
