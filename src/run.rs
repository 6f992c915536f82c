//! Runner and the orchestrating run loop
//!
//! The runner stamps the `.lastRun` marker and replaces the launcher
//! process with the cached binary. The loop around it tolerates a moving
//! cache: peers may install a fresh binary at any moment and the evictor
//! may delete ours between the freshness check and the exec, so a
//! missing-binary exec is retried from the top a few times.

use std::fs;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use filetime::FileTime;
use thiserror::Error;
use tracing::debug;

use crate::build::{BuildError, Builder};
use crate::embed::EmbedError;
use crate::evict::Evictor;
use crate::freshness::{self, FreshnessError};
use crate::script::{CacheLayout, Script, ScriptError};
use crate::toolchain::{Toolchain, ToolchainError};

/// How often a vanished binary is rebuilt before giving up.
const EXEC_RETRIES: u32 = 5;

/// Any failure the launcher can surface to the user.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Freshness(#[from] FreshnessError),

    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error("failed to exec {binary}: {source}")]
    Exec { binary: PathBuf, source: io::Error },

    #[error("running script failed to find compiled binary: {0}")]
    BinaryVanished(io::Error),
}

/// Launch options, straight from the CLI surface.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Binary eviction TTL in days; negative disables eviction and the
    /// `.lastRun` touch.
    pub clean_days: i64,
    /// Keep staging trees and log diagnostics.
    pub debug: bool,
    /// Also rebuild when the binary was built by a different toolchain
    /// version than the installed one.
    pub strict_version: bool,
    /// Stop after a successful (re)build instead of running.
    pub no_run: bool,
    /// Root of the cache hierarchy.
    pub cache_base: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            clean_days: 14,
            debug: false,
            strict_version: false,
            no_run: false,
            cache_base: PathBuf::from("/tmp"),
        }
    }
}

/// Compile (when stale) and exec one script. `args` is the argv for the
/// compiled binary, `args[0]` being the script path as the user typed it.
/// On success this never returns.
pub fn run_script(source: &Path, args: Vec<String>, opts: &RunOptions) -> Result<(), LaunchError> {
    let toolchain = Toolchain::locate()?;
    run_script_with(source, args, opts, &toolchain)
}

/// [`run_script`] against an explicitly located toolchain.
pub fn run_script_with(
    source: &Path,
    args: Vec<String>,
    opts: &RunOptions,
    toolchain: &Toolchain,
) -> Result<(), LaunchError> {
    let script = Script::resolve(source, args)?;
    let layout = CacheLayout::derive(&script, &opts.cache_base)?;

    if let Some(ttl) = binary_ttl(opts.clean_days) {
        Evictor::new(layout.per_user_root.clone(), ttl).evict();
    }

    let builder = Builder::new(&script, &layout, toolchain, opts.strict_version, opts.debug);

    let mut last_missing = None;
    for _ in 0..EXEC_RETRIES {
        // the cache moves under us: peers install binaries, the evictor
        // removes them
        if freshness::is_out_of_date(&script, &layout, toolchain, opts.strict_version)? {
            builder.wait_for_peers();
            if freshness::is_out_of_date(&script, &layout, toolchain, opts.strict_version)? {
                builder.build()?;
            }
        }

        if opts.no_run {
            return Ok(());
        }
        if opts.clean_days >= 0 {
            let _ = touch(&layout.last_run);
        }

        let err = exec(&layout.binary, &script.args);
        if err.kind() != io::ErrorKind::NotFound {
            return Err(LaunchError::Exec {
                binary: layout.binary.clone(),
                source: err,
            });
        }
        debug!("binary vanished before exec, rebuilding");
        last_missing = Some(err);
    }

    Err(LaunchError::BinaryVanished(last_missing.unwrap_or_else(
        || io::Error::from(io::ErrorKind::NotFound),
    )))
}

fn binary_ttl(clean_days: i64) -> Option<Duration> {
    u64::try_from(clean_days)
        .ok()
        .map(|days| Duration::from_secs(days * 24 * 3600))
}

/// Create the marker file, or refresh its mtime if it already exists.
pub fn touch(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path).is_err() {
        fs::File::create(path)?;
        return Ok(());
    }
    filetime::set_file_mtime(path, FileTime::now())
}

/// Replace this process with the compiled binary. Only returns on failure.
fn exec(binary: &Path, args: &[String]) -> io::Error {
    let mut cmd = Command::new(binary);
    if let Some((argv0, rest)) = args.split_first() {
        cmd.arg0(argv0);
        cmd.args(rest);
    }
    cmd.exec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_clean_days_disables_eviction() {
        assert_eq!(binary_ttl(-1), None);
        assert_eq!(binary_ttl(0), Some(Duration::from_secs(0)));
        assert_eq!(binary_ttl(14), Some(Duration::from_secs(14 * 24 * 3600)));
    }

    #[test]
    fn touch_creates_then_refreshes() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join(".lastRun");

        touch(&marker).unwrap();
        assert!(marker.exists());

        let past = std::time::SystemTime::now() - Duration::from_secs(600);
        filetime::set_file_mtime(&marker, FileTime::from_system_time(past)).unwrap();
        let before = fs::metadata(&marker).unwrap().modified().unwrap();

        touch(&marker).unwrap();
        let after = fs::metadata(&marker).unwrap().modified().unwrap();
        assert!(after > before);
    }

    #[test]
    fn exec_of_missing_binary_reports_not_found() {
        let err = exec(
            Path::new("/nonexistent/definitely/not/here"),
            &["script.go".to_string()],
        );
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
