//! Workspace manifest `use` parser
//!
//! The launcher only needs one fact from an embedded workspace file: the
//! list of `use` directive paths. This parses the single-line form
//! (`use ../shared`) and the block form (`use ( ... )`), with `//` line
//! comments and optional double-quoting. Everything else in the manifest
//! is ignored.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkfileError {
    #[error("workspace manifest line {line}: malformed use directive")]
    MalformedUse { line: usize },
    #[error("workspace manifest: unclosed use block")]
    UnclosedUseBlock,
}

fn strip_comment(line: &str) -> &str {
    match line.find("//") {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn unquote(token: &str, line: usize) -> Result<String, WorkfileError> {
    if let Some(rest) = token.strip_prefix('"') {
        let inner = rest
            .strip_suffix('"')
            .ok_or(WorkfileError::MalformedUse { line })?;
        return Ok(inner.to_string());
    }
    Ok(token.to_string())
}

/// Extract every `use` path from workspace manifest bytes, in order.
pub fn use_paths(content: &[u8]) -> Result<Vec<String>, WorkfileError> {
    let text = String::from_utf8_lossy(content);
    let mut paths = Vec::new();
    let mut in_block = false;

    for (idx, raw) in text.lines().enumerate() {
        let line = strip_comment(raw).trim();
        let lineno = idx + 1;
        if line.is_empty() {
            continue;
        }
        if in_block {
            if line == ")" {
                in_block = false;
            } else {
                paths.push(unquote(line, lineno)?);
            }
            continue;
        }
        let Some(rest) = line.strip_prefix("use") else {
            continue;
        };
        if !rest.starts_with(char::is_whitespace) {
            continue; // an identifier that merely begins with "use"
        }
        let rest = rest.trim();
        if rest == "(" {
            in_block = true;
        } else if rest.is_empty() {
            return Err(WorkfileError::MalformedUse { line: lineno });
        } else {
            paths.push(unquote(rest, lineno)?);
        }
    }

    if in_block {
        return Err(WorkfileError::UnclosedUseBlock);
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_manifest_has_no_uses() {
        assert!(use_paths(b"").unwrap().is_empty());
        assert!(use_paths(b"\ngo 1.24.0\n").unwrap().is_empty());
    }

    #[test]
    fn single_line_use() {
        let paths = use_paths(b"go 1.24.0\n\nuse ../shared\nuse ./local\n").unwrap();
        assert_eq!(paths, vec!["../shared", "./local"]);
    }

    #[test]
    fn block_use_with_comments_and_quotes() {
        let src = b"use (\n\t../shared // a sibling\n\t\"./local\"\n)\n";
        assert_eq!(use_paths(src).unwrap(), vec!["../shared", "./local"]);
    }

    #[test]
    fn unclosed_block_is_an_error() {
        assert!(matches!(
            use_paths(b"use (\n\t../shared\n"),
            Err(WorkfileError::UnclosedUseBlock)
        ));
    }

    #[test]
    fn use_prefixed_identifier_is_not_a_directive() {
        assert!(use_paths(b"useful nonsense\n").unwrap().is_empty());
    }
}
