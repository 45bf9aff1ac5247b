//! POSIX shared memory objects backing the rings.

use std::fs::File;

use nix::fcntl::OFlag;
use nix::sys::mman::{ shm_open, shm_unlink };
use nix::sys::stat::Mode;

use crate::constants::MAX_NAME_LEN;
use crate::error::{ Result, RingError };

/// Map a ring name onto a shared memory object name (`events` -> `/events`).
pub fn object_name(name: &str) -> Result<String> {
    let bare = name.strip_prefix('/').unwrap_or(name);
    let reason = if bare.is_empty() {
        Some("empty name")
    } else if bare.contains('/') {
        Some("names may not contain '/' after the leading one")
    } else if bare.contains('\0') {
        Some("names may not contain NUL")
    } else if bare.len() + 1 > MAX_NAME_LEN {
        Some("name too long")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(RingError::InvalidName { name: name.to_string(), reason }),
        None => Ok(format!("/{}", bare)),
    }
}

/// Create a new object exclusively; fails if it already exists.
pub fn create(object: &str) -> Result<File> {
    let mode =
        Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IWGRP | Mode::S_IROTH | Mode::S_IWOTH;
    let fd = shm_open(object, OFlag::O_RDWR | OFlag::O_CREAT | OFlag::O_EXCL, mode)?;
    Ok(File::from(fd))
}

/// Open an existing object read/write.
pub fn open(object: &str) -> Result<File> {
    let fd = shm_open(object, OFlag::O_RDWR, Mode::empty())?;
    Ok(File::from(fd))
}

/// Remove the object name. Existing mappings stay valid until unmapped.
pub fn unlink(object: &str) -> Result<()> {
    shm_unlink(object)?;
    Ok(())
}

/// Host page size
pub fn page_size() -> usize {
    // SAFETY: sysconf has no memory safety preconditions
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as usize } else { 4096 }
}

/// Round `bytes` up to a whole number of pages.
pub fn round_to_pages(bytes: usize) -> Option<usize> {
    let page = page_size();
    bytes.checked_add(page - 1).map(|b| (b / page) * page)
}

/// Caller's pid as stored in cursor records
pub fn current_pid() -> i64 {
    nix::unistd::getpid().as_raw() as i64
}

/// Whether `pid` still names a live process.
///
/// `EPERM` means the process exists but belongs to someone else.
pub fn pid_alive(pid: i64) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::{ kill, Signal };
    use nix::unistd::Pid;

    if pid <= 0 || pid > i32::MAX as i64 {
        return false;
    }
    match kill(Pid::from_raw(pid as i32), None::<Signal>) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_name_normalisation() {
        assert_eq!(object_name("events").unwrap(), "/events");
        assert_eq!(object_name("/events").unwrap(), "/events");
    }

    #[test]
    fn test_object_name_rejects_bad_names() {
        assert!(matches!(object_name(""), Err(RingError::InvalidName { .. })));
        assert!(matches!(object_name("/"), Err(RingError::InvalidName { .. })));
        assert!(matches!(object_name("a/b"), Err(RingError::InvalidName { .. })));
        let long = "x".repeat(MAX_NAME_LEN);
        assert!(matches!(object_name(&long), Err(RingError::InvalidName { .. })));
        assert!(object_name(&"x".repeat(MAX_NAME_LEN - 1)).is_ok());
    }

    #[test]
    fn test_round_to_pages() {
        let page = page_size();
        assert!(page.is_power_of_two());
        assert_eq!(round_to_pages(1), Some(page));
        assert_eq!(round_to_pages(page), Some(page));
        assert_eq!(round_to_pages(page + 1), Some(2 * page));
        assert_eq!(round_to_pages(usize::MAX), None);
    }

    #[test]
    fn test_pid_alive() {
        assert!(pid_alive(current_pid()));
        assert!(!pid_alive(-1));
        assert!(!pid_alive(0));
    }
}
