//! Shared fixtures: a stub compiler so no real toolchain is needed.
#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use gorun::Toolchain;

/// Write an executable shell script and wrap it as a toolchain.
pub fn write_stub(dir: &Path, body: &str) -> Toolchain {
    let path = dir.join("go");
    let mut file = fs::File::create(&path).unwrap();
    file.write_all(body.as_bytes()).unwrap();
    drop(file);
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    Toolchain::from_path(path)
}

/// Stub `go` tool body: `build -o <out> .` writes a runnable binary and
/// appends one line to the marker file; `version [file]` answers the two
/// probes with the given toolchain versions.
pub fn stub_body(marker: &Path, built_with: &str, installed: &str) -> String {
    format!(
        r#"#!/bin/sh
cmd="$1"
if [ "$cmd" = build ]; then
    shift
    out=""
    while [ $# -gt 0 ]; do
        if [ "$1" = -o ]; then
            out="$2"
            shift 2
        else
            shift
        fi
    done
    printf '#!/bin/sh\nexit 0\n' > "$out"
    chmod 755 "$out"
    echo build >> "{marker}"
elif [ "$cmd" = version ]; then
    if [ -n "$2" ]; then
        echo "$2: {built_with}"
    else
        echo "go version {installed} linux/amd64"
    fi
fi
"#,
        marker = marker.display(),
        built_with = built_with,
        installed = installed,
    )
}

/// The default stub: one toolchain version everywhere.
pub fn stub_compiler(dir: &Path, marker: &Path) -> Toolchain {
    write_stub(dir, &stub_body(marker, "go1.24.0", "go1.24.0"))
}

/// How many builds the stub compiler has performed.
pub fn build_count(marker: &Path) -> usize {
    fs::read_to_string(marker)
        .map(|log| log.lines().count())
        .unwrap_or(0)
}

/// A stub whose version probe always fails, as it would on a zero-filled
/// binary.
pub fn stub_compiler_failing_probe(dir: &Path) -> Toolchain {
    write_stub(dir, "#!/bin/sh\nif [ \"$1\" = version ]; then exit 1; fi\n")
}

pub fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

pub fn mode_of(path: &Path) -> u32 {
    fs::metadata(path).unwrap().permissions().mode() & 0o777
}

pub fn canonical_tempdir(tmp: &tempfile::TempDir) -> PathBuf {
    tmp.path().canonicalize().unwrap()
}
