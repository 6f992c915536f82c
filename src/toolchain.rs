//! Compiler toolchain location and version probes
//!
//! The external compiler is found through `$GOROOT/bin` first and the
//! `PATH` second. Two probes drive freshness decisions: `go version
//! <binary>` reports the toolchain a cached binary was built with (and
//! fails outright on a corrupt binary), `go version` reports the installed
//! toolchain.

use std::env;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use thiserror::Error;

/// Name of the compiler executable.
pub const COMPILER: &str = "go";

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("can't find go tool in GOROOT ({goroot}) or PATH ({path})")]
    NotFound { goroot: String, path: String },

    #[error("failed to invoke go: {0}")]
    Invoke(io::Error),

    #[error("go version probe exited with {status}")]
    ProbeFailed { status: ExitStatus },

    #[error("unable to find version in {output:?}")]
    MalformedVersion { output: String },
}

/// A located compiler binary.
#[derive(Debug, Clone)]
pub struct Toolchain {
    bin: PathBuf,
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

impl Toolchain {
    /// Locate the compiler: `$GOROOT/bin/go` when GOROOT is set and the
    /// file exists, otherwise the first executable `go` on the PATH.
    pub fn locate() -> Result<Self, ToolchainError> {
        let goroot = env::var("GOROOT").unwrap_or_default();
        if !goroot.is_empty() {
            let candidate = Path::new(&goroot).join("bin").join(COMPILER);
            if candidate.is_file() {
                return Ok(Toolchain { bin: candidate });
            }
        }

        if let Some(path) = env::var_os("PATH") {
            for dir in env::split_paths(&path) {
                if dir.as_os_str().is_empty() {
                    continue;
                }
                let candidate = dir.join(COMPILER);
                if is_executable(&candidate) {
                    return Ok(Toolchain { bin: candidate });
                }
            }
        }

        Err(ToolchainError::NotFound {
            goroot,
            path: env::var("PATH").unwrap_or_default(),
        })
    }

    /// Use an explicit compiler path, bypassing the search.
    pub fn from_path(bin: PathBuf) -> Self {
        Toolchain { bin }
    }

    /// Path of the compiler executable.
    pub fn bin(&self) -> &Path {
        &self.bin
    }

    /// Toolchain version embedded in a compiled binary: the last field of
    /// `go version <binary>`, e.g. `/cache/x.go.bin: go1.24.2` → `go1.24.2`.
    pub fn compiled_version(&self, binary: &Path) -> Result<String, ToolchainError> {
        let binary = binary.to_string_lossy();
        self.version_field(&["version", &*binary], 1)
    }

    /// Installed toolchain version: the second-to-last field of
    /// `go version`, e.g. `go version go1.24.2 linux/amd64` → `go1.24.2`.
    pub fn installed_version(&self) -> Result<String, ToolchainError> {
        self.version_field(&["version"], 2)
    }

    fn version_field(&self, args: &[&str], from_end: usize) -> Result<String, ToolchainError> {
        let output = Command::new(&self.bin)
            .args(args)
            .output()
            .map_err(ToolchainError::Invoke)?;
        if !output.status.success() {
            return Err(ToolchainError::ProbeFailed {
                status: output.status,
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout.strip_suffix('\n').unwrap_or(&stdout);
        let fields: Vec<&str> = line.split(' ').collect();
        if fields.len() < 2 {
            return Err(ToolchainError::MalformedVersion {
                output: line.to_string(),
            });
        }
        Ok(fields[fields.len() - from_end].to_string())
    }
}
