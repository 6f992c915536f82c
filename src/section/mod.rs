//! Embedded-section codec
//!
//! A script can carry its module manifests as comment blocks at the top of
//! the file, each delimited by a header line `// <name> >>>` and a trailer
//! line `// <<< <name>`. The body between them is the manifest content with
//! every line prefixed by `// :` (or `// ` in older scripts, accepted on
//! decode only). This module locates, decodes, encodes, removes and inserts
//! such sections; everything works on raw bytes, no host-language parsing.

mod diff;

pub use diff::{diff_section, load_manifest, normalize, SectionDiff};

/// Module manifest section name.
pub const GOMOD: &str = "go.mod";
/// Checksum file section name.
pub const GOSUM: &str = "go.sum";
/// Workspace file section name.
pub const GOWORK: &str = "go.work";
/// Workspace checksum file section name.
pub const GOWORKSUM: &str = "go.work.sum";
/// Build-environment section name, consumed at build time (decode only,
/// never staged as a file).
pub const GOENV: &str = "go.env";

/// The four manifest sections that are staged, embedded, extracted and
/// diffed, in their canonical on-source order.
pub const MANIFEST_SECTIONS: [&str; 4] = [GOMOD, GOSUM, GOWORK, GOWORKSUM];

/// Line prefix applied to section bodies on encode.
const LINE_PREFIX: &[u8] = b"\n// :";
/// Older scripts prefixed body lines with `// ` only.
const LEGACY_LINE_PREFIX: &[u8] = b"\n// ";

fn header(name: &str) -> String {
    format!("// {name} >>>\n")
}

fn trailer(name: &str) -> String {
    format!("// <<< {name}\n")
}

/// Byte offsets of one embedded section within a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSpan {
    /// First byte of the header line.
    pub start: usize,
    /// First byte of the encoded body.
    pub inner_start: usize,
    /// One past the last byte of the encoded body.
    pub inner_end: usize,
    /// One past the last byte of the trailer line.
    pub end: usize,
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn replace_all(input: &[u8], from: &[u8], to: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut rest = input;
    while let Some(idx) = find_bytes(rest, from) {
        out.extend_from_slice(&rest[..idx]);
        out.extend_from_slice(to);
        rest = &rest[idx + from.len()..];
    }
    out.extend_from_slice(rest);
    out
}

/// Locate a section by exact byte search for its header and trailer lines.
/// A section is found iff both occur and the trailer lies after the header.
pub fn find_section(content: &[u8], name: &str) -> Option<SectionSpan> {
    let header = header(name);
    let trailer = trailer(name);
    let start = find_bytes(content, header.as_bytes())?;
    let inner_start = start + header.len();
    let inner_end = find_bytes(content, trailer.as_bytes())?;
    if inner_end < inner_start {
        return None;
    }
    Some(SectionSpan {
        start,
        inner_start,
        inner_end,
        end: inner_end + trailer.len(),
    })
}

/// Decode the named section, or `None` if it is not embedded.
///
/// The decoded bytes keep a leading newline introduced by the line-prefix
/// replacement; callers trim before comparing. If stripping the `// :`
/// prefix changes nothing, the legacy `// ` prefix is tried instead.
pub fn get_section(content: &[u8], name: &str) -> Option<Vec<u8>> {
    let span = find_section(content, name)?;
    let inner = &content[span.inner_start..span.inner_end];
    let mut body = Vec::with_capacity(inner.len() + 1);
    body.push(b'\n');
    body.extend_from_slice(inner);
    let decoded = replace_all(&body, LINE_PREFIX, b"\n");
    if decoded.len() == inner.len() + 1 {
        return Some(replace_all(&decoded, LEGACY_LINE_PREFIX, b"\n"));
    }
    Some(decoded)
}

/// Remove the named section. Returns the offset it was removed from (if it
/// was present) and the resulting document.
pub fn remove_section(content: &[u8], name: &str) -> (Option<usize>, Vec<u8>) {
    match find_section(content, name) {
        Some(span) => {
            let mut out = Vec::with_capacity(content.len() - (span.end - span.start));
            out.extend_from_slice(&content[..span.start]);
            out.extend_from_slice(&content[span.end..]);
            (Some(span.start), out)
        }
        None => (None, content.to_vec()),
    }
}

/// Encode a body as a delimited comment block.
fn comment_section(body: &[u8], name: &str) -> Vec<u8> {
    let mut out = header(name).into_bytes();
    out.extend_from_slice(b"// :");
    out.extend_from_slice(&replace_all(body, b"\n", LINE_PREFIX));
    out.push(b'\n');
    out.extend_from_slice(trailer(name).as_bytes());
    out
}

/// Replace or insert the named section with a new body.
///
/// An existing section is replaced in place. Otherwise the insertion point
/// is directly after the last of the `preceding` sections that exists in
/// the document (with a blank-line separator), or offset 0 if none do.
/// Returns the offset the section was written at and the new document.
pub fn embed_section(
    content: &[u8],
    body: &[u8],
    name: &str,
    preceding: &[&str],
) -> (usize, Vec<u8>) {
    let (found_at, stripped) = remove_section(content, name);
    let mut idx = found_at.unwrap_or(0);
    let mut add_newline = false;
    if found_at.is_none() {
        for prev in preceding {
            if let Some(span) = find_section(&stripped, prev) {
                if span.end > idx {
                    idx = span.end;
                    add_newline = true;
                }
            }
        }
    }

    let encoded = comment_section(body, name);
    let mut out = Vec::with_capacity(stripped.len() + encoded.len() + 1);
    out.extend_from_slice(&stripped[..idx]);
    if add_newline {
        out.push(b'\n');
    }
    out.extend_from_slice(&encoded);
    out.extend_from_slice(&stripped[idx..]);
    (idx, out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "package main\n\nfunc main() {}\n";

    #[test]
    fn absent_section_is_none() {
        assert_eq!(get_section(DOC.as_bytes(), GOMOD), None);
    }

    #[test]
    fn embed_then_get_round_trips() {
        let body = b"module demo\n\ngo 1.24.0";
        let (_, doc) = embed_section(DOC.as_bytes(), body, GOMOD, &[]);
        let decoded = get_section(&doc, GOMOD).unwrap();
        // decode keeps the leading newline the prefix replacement introduced
        assert_eq!(&decoded[1..], b"module demo\n\ngo 1.24.0\n");
    }

    #[test]
    fn embed_is_idempotent() {
        let body = b"module demo";
        let (_, once) = embed_section(DOC.as_bytes(), body, GOMOD, &[]);
        let (_, twice) = embed_section(&once, body, GOMOD, &[]);
        assert_eq!(once, twice);
    }

    #[test]
    fn first_embed_lands_at_offset_zero_without_separator() {
        let (idx, doc) = embed_section(DOC.as_bytes(), b"module demo", GOMOD, &[]);
        assert_eq!(idx, 0);
        assert!(doc.starts_with(b"// go.mod >>>\n// :module demo\n// <<< go.mod\n"));
        assert!(doc.ends_with(DOC.as_bytes()));
    }

    #[test]
    fn canonical_order_is_preserved_across_all_four() {
        let mut doc = DOC.as_bytes().to_vec();
        let order: [(&str, &[&str]); 4] = [
            (GOMOD, &[]),
            (GOSUM, &[GOMOD]),
            (GOWORK, &[GOMOD, GOSUM]),
            (GOWORKSUM, &[GOMOD, GOSUM, GOWORK]),
        ];
        // embed out of order on purpose
        for (name, preceding) in [order[3], order[0], order[2], order[1]] {
            let (_, next) = embed_section(&doc, name.as_bytes(), name, preceding);
            doc = next;
        }
        let positions: Vec<usize> = MANIFEST_SECTIONS
            .iter()
            .map(|name| find_section(&doc, name).unwrap().start)
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");
    }

    #[test]
    fn replace_in_place_keeps_position() {
        let (_, doc) = embed_section(DOC.as_bytes(), b"module one", GOMOD, &[]);
        let before = find_section(&doc, GOMOD).unwrap().start;
        let (idx, doc) = embed_section(&doc, b"module two", GOMOD, &[]);
        assert_eq!(idx, before);
        let decoded = get_section(&doc, GOMOD).unwrap();
        assert_eq!(&decoded[1..], b"module two\n");
    }

    #[test]
    fn legacy_prefix_decodes() {
        let doc = "// go.mod >>>\n// module legacy\n// go 1.21\n// <<< go.mod\n";
        let decoded = get_section(doc.as_bytes(), GOMOD).unwrap();
        assert_eq!(decoded, b"\nmodule legacy\ngo 1.21\n");
    }

    #[test]
    fn trailer_before_header_is_not_a_section() {
        let doc = "// <<< go.mod\ncode\n// go.mod >>>\n";
        assert!(find_section(doc.as_bytes(), GOMOD).is_none());
        assert_eq!(get_section(doc.as_bytes(), GOMOD), None);
    }

    #[test]
    fn remove_section_strips_the_whole_block() {
        let (_, doc) = embed_section(DOC.as_bytes(), b"module demo", GOMOD, &[]);
        let (idx, stripped) = remove_section(&doc, GOMOD);
        assert_eq!(idx, Some(0));
        assert_eq!(stripped, DOC.as_bytes());
    }

    #[test]
    fn remove_missing_section_returns_document_unchanged() {
        let (idx, out) = remove_section(DOC.as_bytes(), GOSUM);
        assert_eq!(idx, None);
        assert_eq!(out, DOC.as_bytes());
    }

    #[test]
    fn empty_body_encodes_to_single_prefixed_line() {
        let (_, doc) = embed_section(b"", b"", GOMOD, &[]);
        assert_eq!(doc, b"// go.mod >>>\n// :\n// <<< go.mod\n");
        assert_eq!(get_section(&doc, GOMOD).unwrap(), b"\n\n");
    }
}
