//! Process and host identity helpers
//!
//! The cache layout is keyed by hostname and uid, and the cooperative build
//! protocol identifies peer builders by the pids encoded in their staging
//! directory names. Liveness of a peer is probed with the null signal.

use std::ffi::CStr;
use std::io;

/// Hostname of this machine, as used in the per-user cache root name.
pub fn hostname() -> io::Result<String> {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    // gethostname need not NUL-terminate on truncation
    buf[buf.len() - 1] = 0;
    let name = unsafe { CStr::from_ptr(buf.as_ptr().cast()) };
    Ok(name.to_string_lossy().into_owned())
}

/// Real uid of the current process.
pub fn uid() -> u32 {
    unsafe { libc::getuid() }
}

/// Pid of the current process.
pub fn pid() -> u32 {
    std::process::id()
}

/// Whether a process with the given pid is currently alive, probed by
/// sending the null signal. EPERM counts as not alive: the cache is
/// per-user, so a pid we cannot signal is not a peer builder.
pub fn is_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    unsafe { libc::kill(pid, 0) == 0 }
}
