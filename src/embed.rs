//! Embedding ops
//!
//! One-shot maintenance commands for the manifests a script carries:
//! `diff` reports drift between the embedded sections and the files beside
//! the script, `extract` writes the sections out, `extract-if-missing`
//! does so only into a pristine directory, and `embed` pulls the on-disk
//! files in, fixing the canonical section order as it goes.

use std::fs;
use std::io;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::section::{
    diff_section, embed_section, get_section, load_manifest, SectionDiff, GOMOD, GOSUM, GOWORK,
    GOWORKSUM, MANIFEST_SECTIONS,
};

/// Canonical on-source ordering: each section is inserted after whichever
/// of its predecessors already exist in the document.
const EMBED_ORDER: [(&str, &[&str]); 4] = [
    (GOMOD, &[]),
    (GOSUM, &[GOMOD]),
    (GOWORK, &[GOMOD, GOSUM]),
    (GOWORKSUM, &[GOMOD, GOSUM, GOWORK]),
];

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

fn read_source(source: &Path) -> Result<Vec<u8>, EmbedError> {
    fs::read(source).map_err(|err| EmbedError::Read {
        path: source.to_path_buf(),
        source: err,
    })
}

fn write_private(path: &Path, bytes: &[u8]) -> Result<(), EmbedError> {
    let into_err = |err| EmbedError::Write {
        path: path.to_path_buf(),
        source: err,
    };
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(into_err)?;
    file.write_all(bytes).map_err(into_err)
}

fn manifest_dir(source: &Path) -> &Path {
    source.parent().unwrap_or(Path::new("/"))
}

/// Report on stderr how each manifest compares between the script and the
/// directory beside it. Returns true when any section drifted or exists on
/// one side only.
pub fn diff(source: &Path) -> Result<bool, EmbedError> {
    let content = read_source(source)?;
    let dir = manifest_dir(source);
    let mut dirty = false;

    for name in MANIFEST_SECTIONS {
        let outcome = diff_section(&content, dir, name).map_err(|err| EmbedError::Read {
            path: dir.join(name),
            source: err,
        })?;
        match outcome {
            SectionDiff::BothAbsent => {
                eprintln!("OK: section {name:?} not embedded or on disc");
            }
            SectionDiff::EmbeddedOnly => {
                eprintln!("WARN: embedded {name:?} exists but nothing on disc");
            }
            SectionDiff::DiskOnly => {
                eprintln!("WARN: on disc {name:?} exists but embedded doesn't");
            }
            SectionDiff::Identical => {
                eprintln!("OK: embedded {name:?} exists and same as on disc");
            }
            SectionDiff::Differs => {
                eprintln!("WARN: embedded {name:?} exists and different to on disc");
            }
        }
        dirty |= !outcome.is_clean();
    }
    Ok(dirty)
}

/// Write the decoded body of every embedded section to its same-named
/// file beside the script, overwriting.
pub fn extract(source: &Path) -> Result<(), EmbedError> {
    let content = read_source(source)?;
    let dir = manifest_dir(source);
    for name in MANIFEST_SECTIONS {
        if let Some(body) = get_section(&content, name) {
            write_private(&dir.join(name), &body)?;
        }
    }
    Ok(())
}

/// Extract, but only when none of the four manifest files exist on disk.
pub fn extract_if_missing(source: &Path) -> Result<(), EmbedError> {
    let dir = manifest_dir(source);
    if MANIFEST_SECTIONS.iter().any(|name| dir.join(name).exists()) {
        return Ok(());
    }
    extract(source)
}

/// Embed each on-disk manifest into the script, in canonical order. Files
/// absent from disk leave their embedded counterparts untouched.
pub fn embed(source: &Path) -> Result<(), EmbedError> {
    let mut content = read_source(source)?;
    let dir = manifest_dir(source);

    for (name, preceding) in EMBED_ORDER {
        let path = dir.join(name);
        let on_disk = load_manifest(&path).map_err(|err| EmbedError::Read {
            path: path.clone(),
            source: err,
        })?;
        if let Some(body) = on_disk {
            let (_, next) = embed_section(&content, &body, name, preceding);
            content = next;
        }
    }

    write_private(source, &content)
}
