//! Cache evictor
//!
//! Two independent policies run before each launch. Whole per-script
//! directories go when their `.lastRun` marker predates the binary TTL —
//! a directory with no marker is kept, since its binary may simply never
//! have been run yet. Inside the survivors, crash debris (pid-named
//! staging roots whose process is gone, and compiler scratch) is removed
//! once it is an hour old.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::debug;

use crate::process;
use crate::script::LAST_RUN_MARKER;

/// Abandoned staging roots and compiler scratch older than this are
/// removed.
pub const DEBRIS_TTL: Duration = Duration::from_secs(3600);

/// Scratch directories the compiler leaves beside the binary (`GOTMPDIR`
/// points it there).
const COMPILER_SCRATCH_PREFIX: &str = "go-build";

/// Sweeps one user's cache root.
pub struct Evictor {
    per_user_root: PathBuf,
    binary_ttl: Duration,
    alive: fn(u32) -> bool,
}

impl Evictor {
    pub fn new(per_user_root: PathBuf, binary_ttl: Duration) -> Self {
        Evictor {
            per_user_root,
            binary_ttl,
            alive: process::is_alive,
        }
    }

    /// Remove per-script directories not run within the binary TTL, then
    /// stale build debris inside the survivors. Individual failures are
    /// skipped; the next launch gets another chance.
    pub fn evict(&self) {
        let Ok(entries) = fs::read_dir(&self.per_user_root) else {
            return;
        };
        let now = SystemTime::now();
        let cutoff = now.checked_sub(self.binary_ttl);
        let debris_cutoff = now.checked_sub(DEBRIS_TTL);

        for entry in entries.flatten() {
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let script_dir = entry.path();

            if let Some(cutoff) = cutoff {
                if let Ok(meta) = fs::metadata(script_dir.join(LAST_RUN_MARKER)) {
                    if meta.modified().map(|m| m < cutoff).unwrap_or(false) {
                        debug!("evicting unused script cache {}", script_dir.display());
                        let _ = fs::remove_dir_all(&script_dir);
                        continue;
                    }
                }
            }

            if let Some(debris_cutoff) = debris_cutoff {
                self.sweep_debris(&script_dir, debris_cutoff);
            }
        }
    }

    fn sweep_debris(&self, script_dir: &Path, cutoff: SystemTime) {
        let Ok(children) = fs::read_dir(script_dir) else {
            return;
        };
        for child in children.flatten() {
            if !child.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let name = child.file_name();
            let name = name.to_string_lossy();
            let pid: Option<u32> = name.parse().ok();
            if pid.is_none() && !name.starts_with(COMPILER_SCRATCH_PREFIX) {
                continue;
            }
            if let Some(pid) = pid {
                if (self.alive)(pid) {
                    continue; // still building
                }
            }
            let stale = child
                .metadata()
                .and_then(|meta| meta.modified())
                .map(|mtime| mtime < cutoff)
                .unwrap_or(false);
            if stale {
                debug!("removing stale build debris {}", child.path().display());
                let _ = fs::remove_dir_all(child.path());
            }
        }
    }
}
