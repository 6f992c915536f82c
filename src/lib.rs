//! Compile-and-run launcher for single-file Go scripts
//!
//! A source file is executed like a shebang script: each launch decides
//! whether the per-user cached binary for it is still fresh, rebuilds it
//! in an isolated staging tree when not, and then replaces the launcher
//! process with the binary. The module manifests a build needs can live
//! inside the script itself as comment-delimited sections, so a single
//! file carries everything.
//!
//! Concurrent launches of the same script coordinate through the
//! filesystem alone: each builder works in a pid-named staging directory,
//! the lowest live pid builds while the others back off, and the finished
//! binary is installed with one atomic rename.

pub mod build;
pub mod embed;
pub mod evict;
pub mod freshness;
pub mod process;
pub mod run;
pub mod script;
pub mod section;
pub mod stage;
pub mod toolchain;
pub mod workfile;

pub use build::{sweep_modes, BuildError, Builder};
pub use embed::EmbedError;
pub use evict::{Evictor, DEBRIS_TTL};
pub use freshness::{is_out_of_date, FreshnessError};
pub use run::{run_script, run_script_with, touch, LaunchError, RunOptions};
pub use script::{real_path, rebase, CacheLayout, Script, ScriptError, LAST_RUN_MARKER};
pub use section::{
    diff_section, embed_section, find_section, get_section, load_manifest, normalize,
    remove_section, SectionDiff, SectionSpan, GOENV, GOMOD, GOSUM, GOWORK, GOWORKSUM,
    MANIFEST_SECTIONS,
};
pub use stage::{stage, StageError};
pub use toolchain::{Toolchain, ToolchainError, COMPILER};
pub use workfile::{use_paths, WorkfileError};
