//! Staging assembler
//!
//! Materialises a self-contained buildable project under the per-invocation
//! directory: the auxiliary and workspace directories are mirrored at their
//! original placement relative to the filesystem root, the source file is
//! copied in (renamed to `.go`, shebang rewritten to a comment), and each
//! manifest is written from its embedded section or copied from disk.

use std::fs;
use std::io;
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::script::{rebase, CacheLayout, Script};
use crate::section::{get_section, MANIFEST_SECTIONS};

/// Staged files are private to the invoking user.
const FILE_MODE: u32 = 0o600;
const DIR_MODE: u32 = 0o700;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("failed to create staging directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to copy {path}: {source}")]
    Copy { path: PathBuf, source: io::Error },

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("only regular files and directories are staged, not {path}")]
    UnsupportedEntry { path: PathBuf },

    #[error(transparent)]
    Walk(#[from] walkdir::Error),
}

/// Assemble the staging tree for one build.
pub fn stage(script: &Script, layout: &CacheLayout) -> Result<(), StageError> {
    // leftovers can exist if a previous invocation with this pid crashed
    let _ = fs::remove_dir_all(&layout.invocation_root);
    make_dirs(&layout.invocation_root)?;

    for dir in script.dependency_dirs() {
        let dest = rebase(&layout.invocation_root, dir);
        make_dirs(&dest)?;
        copy_tree(dir, &dest)?;
    }

    let basename = match script.source_path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => String::new(),
    };
    let mut staged_name = basename;
    if !staged_name.ends_with(".go") {
        staged_name.push_str(".go");
    }

    let mut bytes = script.source_bytes.clone();
    if bytes.len() > 2 && bytes[0] == b'#' && bytes[1] == b'!' {
        bytes[0] = b'/';
        bytes[1] = b'/';
    }
    make_dirs(&layout.staging_dir)?;
    write_file(&layout.staging_dir.join(&staged_name), &bytes)?;

    for name in MANIFEST_SECTIONS {
        stage_manifest(script, layout, name)?;
    }
    Ok(())
}

/// Write one manifest into the staging tree: the embedded section wins,
/// otherwise the same-named entry beside the script is copied; a script
/// with neither just builds without it.
fn stage_manifest(script: &Script, layout: &CacheLayout, name: &str) -> Result<(), StageError> {
    let dest = layout.staging_dir.join(name);
    if let Some(body) = get_section(&script.source_bytes, name) {
        return write_file(&dest, &body);
    }

    let src = script.source_dir().join(name);
    match fs::metadata(&src) {
        Ok(meta) if meta.is_dir() => {
            if let Err(err) = copy_tree(&src, &dest) {
                debug!("skipping on-disk {name}: {err}");
            }
        }
        Ok(_) => match fs::read(&src) {
            Ok(content) => write_file(&dest, &content)?,
            Err(err) => debug!("skipping on-disk {name}: {err}"),
        },
        Err(_) => {}
    }
    Ok(())
}

/// Mirror a directory tree. Only regular files and directories are
/// handled; anything else fails the build with a clear error.
fn copy_tree(src: &Path, dest_root: &Path) -> Result<(), StageError> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let Ok(rel) = entry.path().strip_prefix(src) else {
            continue;
        };
        let dest = dest_root.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            make_dirs(&dest)?;
        } else if file_type.is_file() {
            let content = fs::read(entry.path()).map_err(|err| StageError::Copy {
                path: entry.path().to_path_buf(),
                source: err,
            })?;
            write_file(&dest, &content)?;
        } else {
            return Err(StageError::UnsupportedEntry {
                path: entry.path().to_path_buf(),
            });
        }
    }
    Ok(())
}

fn make_dirs(path: &Path) -> Result<(), StageError> {
    fs::DirBuilder::new()
        .recursive(true)
        .mode(DIR_MODE)
        .create(path)
        .map_err(|err| StageError::CreateDir {
            path: path.to_path_buf(),
            source: err,
        })
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), StageError> {
    let into_err = |err| StageError::Write {
        path: path.to_path_buf(),
        source: err,
    };
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(FILE_MODE)
        .open(path)
        .map_err(into_err)?;
    file.write_all(bytes).map_err(into_err)
}
