//! Drift classification between embedded sections and on-disk manifests
//!
//! Comparison happens on normalised bytes: both sides are trimmed and have
//! doubled blank lines collapsed, so cosmetic whitespace never reads as
//! drift.

use std::fs;
use std::io;
use std::path::Path;

use super::{get_section, replace_all};

/// How one section compares between the script and the directory beside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionDiff {
    /// Neither embedded nor on disk.
    BothAbsent,
    /// Embedded in the script, no file on disk.
    EmbeddedOnly,
    /// File on disk, nothing embedded.
    DiskOnly,
    /// Present on both sides with identical normalised content.
    Identical,
    /// Present on both sides with different content.
    Differs,
}

impl SectionDiff {
    /// True when the section needs no attention.
    pub fn is_clean(self) -> bool {
        matches!(self, SectionDiff::BothAbsent | SectionDiff::Identical)
    }
}

/// Trim surrounding whitespace and collapse doubled newlines.
pub fn normalize(content: &[u8]) -> Vec<u8> {
    replace_all(content.trim_ascii(), b"\n\n", b"\n")
}

/// Load a manifest file, normalised. `Ok(None)` when the file is absent;
/// an unreadable file that exists is an error.
pub fn load_manifest(path: &Path) -> io::Result<Option<Vec<u8>>> {
    if fs::symlink_metadata(path).is_err() {
        return Ok(None);
    }
    let content = fs::read(path)?;
    Ok(Some(normalize(&content)))
}

/// Compare the named section of a script against the same-named file in
/// `dir`. An embedded section that normalises to empty counts as absent.
pub fn diff_section(content: &[u8], dir: &Path, name: &str) -> io::Result<SectionDiff> {
    let embedded = get_section(content, name)
        .map(|body| normalize(&body))
        .unwrap_or_default();
    let on_disk = load_manifest(&dir.join(name))?;

    Ok(match on_disk {
        None if embedded.is_empty() => SectionDiff::BothAbsent,
        None => SectionDiff::EmbeddedOnly,
        Some(disk) => {
            if embedded.is_empty() && !disk.is_empty() {
                SectionDiff::DiskOnly
            } else if embedded == disk {
                SectionDiff::Identical
            } else {
                SectionDiff::Differs
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::super::{embed_section, GOMOD};
    use super::*;

    #[test]
    fn normalize_trims_and_collapses() {
        assert_eq!(normalize(b"  module x\n\ngo 1.24\n\n"), b"module x\ngo 1.24");
        assert_eq!(normalize(b"\n"), b"");
    }

    #[test]
    fn both_absent_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let diff = diff_section(b"package main\n", dir.path(), GOMOD).unwrap();
        assert_eq!(diff, SectionDiff::BothAbsent);
        assert!(diff.is_clean());
    }

    #[test]
    fn classifies_each_side() {
        let dir = tempfile::tempdir().unwrap();
        let (_, doc) = embed_section(b"package main\n", b"module x", GOMOD, &[]);

        assert_eq!(
            diff_section(&doc, dir.path(), GOMOD).unwrap(),
            SectionDiff::EmbeddedOnly
        );

        std::fs::write(dir.path().join(GOMOD), "module x\n").unwrap();
        assert_eq!(
            diff_section(&doc, dir.path(), GOMOD).unwrap(),
            SectionDiff::Identical
        );

        std::fs::write(dir.path().join(GOMOD), "module y\n").unwrap();
        assert_eq!(
            diff_section(&doc, dir.path(), GOMOD).unwrap(),
            SectionDiff::Differs
        );

        assert_eq!(
            diff_section(b"package main\n", dir.path(), GOMOD).unwrap(),
            SectionDiff::DiskOnly
        );
    }
}
