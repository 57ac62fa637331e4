//! Path formatting, directory creation, advisory locking, and the
//! create-exclusive template mechanism the local and journal sinks share.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use nix::fcntl::{flock, FlockArg};
use nix::unistd::{Gid, Uid};

use crate::error::{LogError, Result};

/// Platform path length bound the spec's "path-too-long" error kind refers
/// to. Linux's `PATH_MAX`.
pub const PATH_MAX: usize = 4096;

/// Format a path from parts, failing with [`LogError::PathTooLong`] instead
/// of silently truncating, matching the C source's `snprintf` + `len >=
/// sizeof(buf)` check.
pub fn format_bounded(parts: &[&str]) -> Result<PathBuf> {
    let joined = parts.join("/");
    if joined.len() >= PATH_MAX {
        return Err(LogError::PathTooLong(joined));
    }
    Ok(PathBuf::from(joined))
}

/// Create `path` and any missing parents, matching `sudo_mkdir_parents`:
/// parents are created with `dir_mode`, ownership set to `(uid, gid)` when
/// running as root (ignored otherwise — `chown` failure here is not fatal
/// for a non-root test harness).
pub fn mkdir_parents(path: &Path, dir_mode: u32) -> Result<()> {
    let mut built = PathBuf::new();
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    for component in parent.components() {
        built.push(component);
        if built.as_os_str().is_empty() {
            continue;
        }
        match std::fs::create_dir(&built) {
            Ok(()) => {
                let perms = std::fs::Permissions::from_mode(dir_mode);
                std::fs::set_permissions(&built, perms)
                    .map_err(|e| LogError::io("chmod", e))?;
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(LogError::io("mkdir", e)),
        }
    }
    Ok(())
}

/// Create `path`'s I/O-log directory tree, retrying under the configured
/// I/O-log owner's effective uid/gid on `EACCES` (the NFS-root scenario).
/// The swap is guaranteed to restore the original ids on every exit path.
pub fn mkdir_parents_iolog(path: &Path, dir_mode: u32, iolog_uid: u32, iolog_gid: u32) -> Result<()> {
    match mkdir_parents(path, dir_mode) {
        Ok(()) => Ok(()),
        Err(LogError::FilesystemIo { source, .. }) if source.kind() == io::ErrorKind::PermissionDenied => {
            let _guard = IdSwapGuard::swap_to(iolog_uid, iolog_gid)?;
            mkdir_parents(path, dir_mode)
        }
        Err(e) => Err(e),
    }
}

/// RAII guard that swaps the process's effective uid/gid for its lifetime,
/// restoring the original ids when dropped (including on an error path that
/// unwinds through it). Scoped to the current thread of control only, which
/// is safe because the core runs single-threaded per the concurrency model.
pub struct IdSwapGuard {
    saved_uid: Uid,
    saved_gid: Gid,
}

impl IdSwapGuard {
    pub fn swap_to(uid: u32, gid: u32) -> Result<Self> {
        let saved_uid = nix::unistd::geteuid();
        let saved_gid = nix::unistd::getegid();
        nix::unistd::setegid(Gid::from_raw(gid)).map_err(|e| LogError::io("setegid", io::Error::from(e)))?;
        nix::unistd::seteuid(Uid::from_raw(uid)).map_err(|e| {
            let _ = nix::unistd::setegid(saved_gid);
            LogError::io("seteuid", io::Error::from(e))
        })?;
        Ok(IdSwapGuard { saved_uid, saved_gid })
    }
}

impl Drop for IdSwapGuard {
    fn drop(&mut self) {
        let _ = nix::unistd::seteuid(self.saved_uid);
        let _ = nix::unistd::setegid(self.saved_gid);
    }
}

/// Acquire an advisory exclusive lock on `file`, matching `sudo_lock_file`'s
/// non-blocking test-lock variant used by journal creation.
pub fn lock_exclusive_nonblocking(file: &File) -> Result<()> {
    flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock).map_err(|e| LogError::io("flock", io::Error::from(e)))
}

pub fn unlock(file: &File) -> Result<()> {
    flock(file.as_raw_fd(), FlockArg::Unlock).map_err(|e| LogError::io("flock", io::Error::from(e)))
}

/// Result of a template-based create-exclusive operation: the realized path
/// and the open file handle, matching `journal_mkstemp`'s `(fd, pathbuf)`
/// pair.
pub struct CreatedFile {
    pub path: PathBuf,
    pub file: File,
}

/// Create a unique file under `dir` named `<prefix>XXXXXX` with `XXXXXX`
/// replaced by six random alphanumeric characters, retrying on collision.
/// Every substituted name has the same length as the template, which is the
/// invariant `journal_finish`'s rename-length check relies on.
pub fn create_unique(dir: &Path, prefix: &str) -> Result<CreatedFile> {
    mkdir_parents(&dir.join("placeholder"), 0o711)?;
    for _ in 0..100 {
        let suffix = random_suffix();
        let name = format!("{prefix}{suffix}");
        let path = dir.join(&name);
        match OpenOptions::new()
            .write(true)
            .read(true)
            .create_new(true)
            .mode(0o600)
            .open(&path)
        {
            Ok(file) => return Ok(CreatedFile { path, file }),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(LogError::io("open", e)),
        }
    }
    Err(LogError::io(
        "open",
        io::Error::new(io::ErrorKind::AlreadyExists, "exhausted unique name attempts"),
    ))
}

const TEMPLATE_SUFFIX_LEN: usize = 6;

fn random_suffix() -> String {
    use rand::Rng;
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..TEMPLATE_SUFFIX_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Generate a fresh, unique `NN/NN/NN`-style log-id directory under
/// `iolog_dir` and create it (with parents) at `dir_mode`. Returns the
/// relative log-id string (the value handed back to the client) and the
/// absolute directory path.
pub fn generate_log_id(iolog_dir: &Path, dir_mode: u32, iolog_uid: u32, iolog_gid: u32) -> Result<(String, PathBuf)> {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    for _ in 0..100 {
        let id = format!(
            "{:02}/{:02}/{:02}",
            rng.gen_range(0..100),
            rng.gen_range(0..100),
            rng.gen_range(0..100)
        );
        let full = iolog_dir.join(&id);
        let parent = full.parent().unwrap_or(iolog_dir);
        mkdir_parents_iolog(&parent.join("placeholder"), dir_mode, iolog_uid, iolog_gid)?;
        match std::fs::create_dir(&full) {
            Ok(()) => {
                let _ = std::fs::set_permissions(&full, std::fs::Permissions::from_mode(dir_mode));
                return Ok((id, full));
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(LogError::io("mkdir", e)),
        }
    }
    Err(LogError::io(
        "mkdir",
        io::Error::new(io::ErrorKind::AlreadyExists, "exhausted log-id attempts"),
    ))
}
