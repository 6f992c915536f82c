//! Script descriptor and cache-path resolution
//!
//! Everything the launcher does is keyed off the canonical absolute path of
//! the source file: the per-script cache directory name is that path with
//! separators flattened to `_`, and the per-invocation staging tree mirrors
//! the directory hierarchy around the script so relative workspace
//! references keep resolving inside the sandbox copy.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};

use thiserror::Error;

use crate::process;
use crate::section::{get_section, GOWORK};
use crate::workfile::{self, WorkfileError};

/// Cache directories are prefixed so a shared `/tmp` stays legible.
const CACHE_PREFIX: &str = "gorun";

/// Marker file whose mtime records the last successful run.
pub const LAST_RUN_MARKER: &str = ".lastRun";

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to find source file: {0}")]
    Source(io::Error),

    #[error("failed to read source file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to determine hostname: {0}")]
    Hostname(io::Error),

    #[error(transparent)]
    Workfile(#[from] WorkfileError),
}

/// One script invocation: the resolved source, its auxiliary inputs, and
/// the argv to hand to the compiled binary.
#[derive(Debug, Clone)]
pub struct Script {
    /// Canonical absolute path, symlinks resolved.
    pub source_path: PathBuf,
    /// Contents of the source file, read once.
    pub source_bytes: Vec<u8>,
    /// `<source minus .go>_` if such a directory exists beside the script.
    pub extra_dir: Option<PathBuf>,
    /// `../`-relative `use` entries from the embedded workspace manifest.
    pub rel_work_dirs: Vec<String>,
    /// The same entries resolved against the script's directory.
    pub work_dirs: Vec<PathBuf>,
    /// Arguments forwarded to the compiled binary; `args[0]` is the script
    /// path exactly as the user typed it.
    pub args: Vec<String>,
}

/// Absolute real path of a source file, resolving symlinks.
pub fn real_path(source: &Path) -> Result<PathBuf, ScriptError> {
    fs::canonicalize(source).map_err(ScriptError::Source)
}

impl Script {
    /// Resolve a source path into a full descriptor. Reads the source once
    /// and parses the embedded workspace manifest for sibling directories.
    pub fn resolve(source: &Path, args: Vec<String>) -> Result<Self, ScriptError> {
        let source_path = real_path(source)?;
        let source_bytes = fs::read(&source_path).map_err(|err| ScriptError::Read {
            path: source_path.clone(),
            source: err,
        })?;

        let path_str = source_path.to_string_lossy();
        let stem = path_str.strip_suffix(".go").unwrap_or(&*path_str);
        let extra_dir = PathBuf::from(format!("{stem}_"));
        let extra_dir = fs::metadata(&extra_dir)
            .ok()
            .filter(|meta| meta.is_dir())
            .map(|_| extra_dir);

        let source_dir = source_path.parent().unwrap_or(Path::new("/"));
        let workspace = get_section(&source_bytes, GOWORK).unwrap_or_default();
        let mut rel_work_dirs = Vec::new();
        let mut work_dirs = Vec::new();
        for entry in workfile::use_paths(&workspace)? {
            // only sibling references leave the staging mirror; ./ entries
            // are already inside it and absolute ones are not ours to copy
            if entry.starts_with("../") {
                work_dirs.push(clean_path(&source_dir.join(&entry)));
                rel_work_dirs.push(entry);
            }
        }

        Ok(Script {
            source_path,
            source_bytes,
            extra_dir,
            rel_work_dirs,
            work_dirs,
            args,
        })
    }

    /// The directories (auxiliary and workspace) whose contents take part
    /// in staging and freshness decisions.
    pub fn dependency_dirs(&self) -> impl Iterator<Item = &Path> {
        self.extra_dir
            .iter()
            .map(PathBuf::as_path)
            .chain(self.work_dirs.iter().map(PathBuf::as_path))
    }

    /// Directory containing the source file.
    pub fn source_dir(&self) -> &Path {
        self.source_path.parent().unwrap_or(Path::new("/"))
    }
}

/// Every cache path for one invocation of one script.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    /// `<base>/gorun-<hostname>-<uid>`: all of this user's cached scripts.
    pub per_user_root: PathBuf,
    /// Per-script directory under the per-user root, named by the
    /// flattened source path.
    pub script_dir: PathBuf,
    /// `<script_dir>/<pid>`: this invocation's staging root.
    pub invocation_root: PathBuf,
    /// The mirrored source directory inside the staging root; the compiler
    /// runs here.
    pub staging_dir: PathBuf,
    /// Final resting place of the compiled binary.
    pub binary: PathBuf,
    /// Marker file whose mtime is the last run.
    pub last_run: PathBuf,
}

impl CacheLayout {
    /// Derive the layout for the current process identity.
    pub fn derive(script: &Script, base: &Path) -> Result<Self, ScriptError> {
        let hostname = process::hostname().map_err(ScriptError::Hostname)?;
        Ok(Self::derive_with(
            script,
            base,
            &hostname,
            process::uid(),
            process::pid(),
        ))
    }

    /// Deterministic core of [`CacheLayout::derive`].
    pub fn derive_with(
        script: &Script,
        base: &Path,
        hostname: &str,
        uid: u32,
        pid: u32,
    ) -> Self {
        let per_user_root = base.join(format!("{CACHE_PREFIX}-{hostname}-{uid}"));
        let flattened = script
            .source_path
            .to_string_lossy()
            .replace(MAIN_SEPARATOR, "_");
        let script_dir = per_user_root.join(flattened);
        let invocation_root = script_dir.join(pid.to_string());
        let staging_dir = rebase(&invocation_root, script.source_dir());

        let binary_name = match script.source_path.file_name() {
            Some(name) => format!("{}.bin", name.to_string_lossy()),
            None => String::from(".bin"),
        };

        CacheLayout {
            binary: script_dir.join(binary_name),
            last_run: script_dir.join(LAST_RUN_MARKER),
            per_user_root,
            script_dir,
            invocation_root,
            staging_dir,
        }
    }
}

/// Re-root an absolute path under `root`, preserving its hierarchy.
pub fn rebase(root: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix("/") {
        Ok(rel) => root.join(rel),
        Err(_) => root.join(path),
    }
}

/// Lexically clean a path: drop `.` components and fold `..` into their
/// parent where one exists.
fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::CurDir => {}
            Component::RootDir => out.push("/"),
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(name) => out.push(name),
        }
    }
    out
}
