//! Reader's lock on a store's `LOCK` file.
//!
//! LevelDB writers (and so a running browser) hold `LOCK` with a POSIX record
//! lock on Unix and `LockFileEx` on Windows. A reader takes the shared form of
//! the same lock, so it conflicts with a live writer and with nothing else.

use std::fs::File;
use std::io;

/// Tries to take a shared lock without blocking. `Ok(false)` means a writer holds it.
pub(crate) fn try_lock_shared(file: &File) -> io::Result<bool> {
    imp::try_lock_shared(file)
}

pub(crate) fn unlock(file: &File) -> io::Result<()> {
    imp::unlock(file)
}

#[cfg(unix)]
mod imp {
    use std::fs::File;
    use std::io;
    use std::os::unix::io::AsRawFd;

    // whole-file fcntl(F_SETLK), the call LevelDB's env_posix makes
    fn set_lock(file: &File, kind: libc::c_short) -> io::Result<()> {
        // SAFETY: flock is plain data; every field not set below is meant to be zero.
        let mut lock: libc::flock = unsafe { std::mem::zeroed() };
        lock.l_type = kind;
        lock.l_whence = libc::SEEK_SET as libc::c_short;
        lock.l_start = 0;
        lock.l_len = 0;

        // SAFETY: the descriptor is open for the lifetime of `file` and `lock` outlives the call.
        let rc = unsafe {
            libc::fcntl(
                file.as_raw_fd(),
                libc::F_SETLK,
                &lock as *const libc::flock,
            )
        };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub(super) fn try_lock_shared(file: &File) -> io::Result<bool> {
        match set_lock(file, libc::F_RDLCK as libc::c_short) {
            Ok(()) => Ok(true),
            Err(e) if matches!(e.raw_os_error(), Some(libc::EACCES | libc::EAGAIN)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub(super) fn unlock(file: &File) -> io::Result<()> {
        set_lock(file, libc::F_UNLCK as libc::c_short)
    }
}

#[cfg(windows)]
mod imp {
    use std::fs::File;
    use std::io;

    use fs2::FileExt;

    pub(super) fn try_lock_shared(file: &File) -> io::Result<bool> {
        match FileExt::try_lock_shared(file) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub(super) fn unlock(file: &File) -> io::Result<()> {
        FileExt::unlock(file)
    }
}

#[cfg(not(any(unix, windows)))]
mod imp {
    use std::fs::File;
    use std::io;

    pub(super) fn try_lock_shared(_file: &File) -> io::Result<bool> {
        Ok(true)
    }

    pub(super) fn unlock(_file: &File) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs::OpenOptions;

    #[test]
    fn shared_locks_stack_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("LOCK");
        std::fs::write(&path, b"").unwrap();

        let first = File::open(&path).unwrap();
        let second = File::open(&path).unwrap();
        assert!(try_lock_shared(&first).unwrap());
        assert!(try_lock_shared(&second).unwrap());
        unlock(&second).unwrap();
        unlock(&first).unwrap();
    }

    #[test]
    fn shared_lock_needs_a_readable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("LOCK");
        let write_only = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .unwrap();

        assert!(try_lock_shared(&write_only).is_err());
    }
}
