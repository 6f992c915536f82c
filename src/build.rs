//! Build coordinator
//!
//! Wraps staging and the compiler subprocess in a cooperative, lock-free
//! concurrency protocol. Concurrent launches of the same script each own a
//! pid-named staging directory under the per-script cache dir; the lowest
//! live pid builds while the others back off and re-check freshness, so a
//! crashed builder can never wedge its peers. The final install of the
//! binary is a single atomic rename.

use std::cmp;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::freshness;
use crate::process;
use crate::script::{CacheLayout, Script};
use crate::section::{get_section, GOENV};
use crate::stage::{self, StageError};
use crate::toolchain::Toolchain;

/// Backoff schedule for the wait phase: 100 ms doubling to a 2 s cap, 12
/// attempts, roughly 17 s in total.
const WAIT_MAX_ATTEMPTS: u32 = 12;
const WAIT_INITIAL: Duration = Duration::from_millis(100);
const WAIT_CAP: Duration = Duration::from_secs(2);

/// Staged files are relaxed to this mode after a build so the tree can be
/// removed even when the compiler leaves read-only cache files behind.
const SWEEP_MODE: u32 = 0o755;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("failed to invoke compiler: {0}")]
    Spawn(io::Error),

    #[error("compiler exited with {status}")]
    CompilerFailed { status: ExitStatus },

    #[error("failed to move binary into cache: {0}")]
    Install(io::Error),
}

/// One build attempt for one script invocation.
pub struct Builder<'a> {
    script: &'a Script,
    layout: &'a CacheLayout,
    toolchain: &'a Toolchain,
    strict_version: bool,
    keep_staging: bool,
    alive: fn(u32) -> bool,
}

impl<'a> Builder<'a> {
    pub fn new(
        script: &'a Script,
        layout: &'a CacheLayout,
        toolchain: &'a Toolchain,
        strict_version: bool,
        keep_staging: bool,
    ) -> Self {
        Builder {
            script,
            layout,
            toolchain,
            strict_version,
            keep_staging,
            alive: process::is_alive,
        }
    }

    /// Back off while a lower-pid live peer is building this script.
    /// Returns `false` when the wait ended early because the binary became
    /// fresh, or when the wait timed out; `true` when no peer was (or
    /// remained) in the way.
    pub fn wait_for_peers(&self) -> bool {
        let mut wait = WAIT_INITIAL;
        for attempt in 1..=WAIT_MAX_ATTEMPTS {
            let Some(peer) = self.lower_live_peer() else {
                return true;
            };
            debug!("peer {peer} is building, waiting {wait:?} (attempt {attempt}/{WAIT_MAX_ATTEMPTS})");
            thread::sleep(wait);

            if let Ok(false) = freshness::is_out_of_date(
                self.script,
                self.layout,
                self.toolchain,
                self.strict_version,
            ) {
                debug!("a peer produced a fresh binary, skipping our build");
                return false;
            }
            wait = cmp::min(wait * 2, WAIT_CAP);
        }
        debug!("timed out waiting for peer builds, proceeding anyway");
        false
    }

    fn lower_live_peer(&self) -> Option<u32> {
        lower_live_peer_in(&self.layout.script_dir, process::pid(), self.alive)
    }

    /// Stage the project, wait out peers, re-check freshness, compile, and
    /// install the binary. The staging tree is removed afterwards unless
    /// debug mode keeps it; its modes are relaxed either way.
    pub fn build(&self) -> Result<(), BuildError> {
        let result = self.build_staged();
        sweep_modes(&self.layout.invocation_root);
        if !self.keep_staging {
            let _ = fs::remove_dir_all(&self.layout.invocation_root);
        }
        result
    }

    fn build_staged(&self) -> Result<(), BuildError> {
        stage::stage(self.script, self.layout)?;
        self.wait_for_peers();
        // a peer may have produced the binary while we waited
        if let Ok(false) = freshness::is_out_of_date(
            self.script,
            self.layout,
            self.toolchain,
            self.strict_version,
        ) {
            return Ok(());
        }

        let env = self.derive_env();
        let staged_binary = self
            .layout
            .staging_dir
            .join(self.layout.binary.file_name().unwrap_or_default());

        let mut cmd = Command::new(self.toolchain.bin());
        cmd.arg("build")
            .arg("-o")
            .arg(&staged_binary)
            .arg(".")
            .current_dir(&self.layout.staging_dir)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .env_clear();
        env.apply(&mut cmd);

        let status = cmd.status().map_err(BuildError::Spawn)?;
        if !status.success() {
            return Err(BuildError::CompilerFailed { status });
        }
        fs::rename(&staged_binary, &self.layout.binary).map_err(BuildError::Install)
    }

    /// Compiler environment: the inherited environment, any embedded
    /// `go.env` lines, a private `HOME` when the real one cannot hold a
    /// cache, and compiler scratch redirected next to the binary where the
    /// evictor sweeps it.
    fn derive_env(&self) -> BuildEnv {
        let mut env = BuildEnv::inherited();
        if let Some(section) = get_section(&self.script.source_bytes, GOENV) {
            env.push_raw_lines(&String::from_utf8_lossy(&section));
        }

        if env.get("GOCACHE").unwrap_or("").is_empty() {
            let home = env.get("HOME").unwrap_or("").to_string();
            let staging = self.layout.staging_dir.to_string_lossy().into_owned();
            if home.is_empty() || home == "/" {
                env.push("HOME", &staging);
            } else {
                let cache = Path::new(&home).join(".cache");
                if !cache.exists() {
                    if let Err(err) = fs::create_dir(&cache) {
                        if err.kind() != io::ErrorKind::AlreadyExists {
                            env.push("HOME", &staging);
                        }
                    }
                }
            }
        }

        env.push("GOTMPDIR", &self.layout.script_dir.to_string_lossy());
        debug!("build environment derived, {} entries", env.lines.len());
        env
    }
}

/// Scan the per-script directory for a live peer builder with a lower pid.
fn lower_live_peer_in(script_dir: &Path, own_pid: u32, alive: fn(u32) -> bool) -> Option<u32> {
    let entries = fs::read_dir(script_dir).ok()?;
    for entry in entries.flatten() {
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name();
        let Ok(pid) = name.to_string_lossy().parse::<u32>() else {
            continue;
        };
        if pid != own_pid && pid < own_pid && alive(pid) {
            return Some(pid);
        }
    }
    None
}

/// Relax every mode under `root` so removal succeeds.
pub fn sweep_modes(root: &Path) {
    for entry in WalkDir::new(root).into_iter().flatten() {
        let _ = fs::set_permissions(entry.path(), fs::Permissions::from_mode(SWEEP_MODE));
    }
}

/// Environment for the compiler subprocess, kept as `KEY=value` lines so
/// later duplicates win, matching subprocess environment semantics.
struct BuildEnv {
    lines: Vec<String>,
}

impl BuildEnv {
    fn inherited() -> Self {
        BuildEnv {
            lines: std::env::vars().map(|(k, v)| format!("{k}={v}")).collect(),
        }
    }

    fn push(&mut self, key: &str, value: &str) {
        self.lines.push(format!("{key}={value}"));
    }

    fn push_raw_lines(&mut self, text: &str) {
        self.lines.extend(text.lines().map(String::from));
    }

    fn get(&self, key: &str) -> Option<&str> {
        let prefix = format!("{key}=");
        self.lines
            .iter()
            .rev()
            .find_map(|line| line.strip_prefix(&prefix))
    }

    fn apply(&self, cmd: &mut Command) {
        for line in &self.lines {
            if let Some((key, value)) = line.split_once('=') {
                if !key.is_empty() {
                    cmd.env(key, value);
                }
            }
        }
    }
}
