//! Freshness oracle
//!
//! Decides whether the cached binary can be run as-is or must be rebuilt.
//! The binary is stale when it is missing, is somehow a directory, or is
//! older than any input file; a binary whose embedded toolchain version
//! cannot be probed is treated as corrupt (zero-filled binaries from
//! unclean shutdowns have been seen in the wild) and rebuilt.

use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use walkdir::WalkDir;

use crate::script::{CacheLayout, Script};
use crate::toolchain::{Toolchain, ToolchainError};

#[derive(Debug, Error)]
pub enum FreshnessError {
    #[error("failed to stat source {path}: {source}")]
    Source { path: PathBuf, source: io::Error },

    #[error("unable to find dependency: {0}")]
    DependencyWalk(walkdir::Error),

    #[error(transparent)]
    Toolchain(ToolchainError),
}

/// Whether the cached binary must be rebuilt. A missing binary is simply
/// stale; an unreadable source or dependency directory is fatal, since a
/// build could not proceed without it either.
pub fn is_out_of_date(
    script: &Script,
    layout: &CacheLayout,
    toolchain: &Toolchain,
    strict_version: bool,
) -> Result<bool, FreshnessError> {
    let Ok(binary_meta) = fs::metadata(&layout.binary) else {
        return Ok(true);
    };

    let source_meta = fs::metadata(&script.source_path).map_err(|err| FreshnessError::Source {
        path: script.source_path.clone(),
        source: err,
    })?;
    let mut newest = source_meta.modified().map_err(|err| FreshnessError::Source {
        path: script.source_path.clone(),
        source: err,
    })?;

    for dir in script.dependency_dirs() {
        for entry in WalkDir::new(dir) {
            let entry = entry.map_err(FreshnessError::DependencyWalk)?;
            let meta = entry.metadata().map_err(FreshnessError::DependencyWalk)?;
            if let Ok(mtime) = meta.modified() {
                if mtime > newest {
                    newest = mtime;
                }
            }
        }
    }

    let mut out_of_date = binary_meta.is_dir()
        || binary_meta.modified().map(|m| m < newest).unwrap_or(true);

    match toolchain.compiled_version(&layout.binary) {
        // no readable version: possibly a corrupt binary, rebuild quietly
        Err(_) => out_of_date = true,
        Ok(built_with) => {
            if !out_of_date && strict_version {
                let installed = toolchain
                    .installed_version()
                    .map_err(FreshnessError::Toolchain)?;
                out_of_date = built_with != installed;
            }
        }
    }

    Ok(out_of_date)
}
