//! gorun CLI
//!
//! Entry point: gathers flags from `GORUN_ARGS` and the command line,
//! dispatches to an embedding op or the run loop, and renders any failure
//! as a single `error:` line with exit code 1.

use std::env;
use std::path::{Path, PathBuf};
use std::process;

use clap::{CommandFactory, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use gorun::run::{run_script, RunOptions};
use gorun::{embed, real_path, LaunchError};

/// Compile and run a Go "script" in a single command.
///
/// Options can be provided via the GORUN_ARGS environment variable, or on
/// the command line. If there exists a directory of the same base name as
/// the script plus a trailing '_', it too is copied and included in the
/// build.
#[derive(Parser, Debug)]
#[command(
    name = "gorun",
    version,
    about = "Compile and run a Go \"script\" in a single command",
    verbatim_doc_comment
)]
struct Cli {
    /// Clean all binaries from this user older than N days; -1 disables cleaning
    #[arg(long = "cleanDays", value_name = "N", default_value_t = 14)]
    clean_days: i64,

    /// Show diff between embedded comments and filesystem go.mod/go.sum/go.work/go.work.sum
    #[arg(long, group = "op")]
    diff: bool,

    /// Embed filesystem go.mod/go.sum/go.work/go.work.sum as comments in the source file
    #[arg(long, group = "op")]
    embed: bool,

    /// Extract the comments to filesystem go.mod/go.sum/go.work/go.work.sum
    #[arg(long, group = "op")]
    extract: bool,

    /// Extract the comments only if none of the manifest files exist on disc
    #[arg(long = "extractIfMissing", group = "op")]
    extract_if_missing: bool,

    /// Provide more debug, don't delete temporary files under the cache
    #[arg(long)]
    debug: bool,

    /// Recompile the script if the binary wasn't built with the installed compiler version
    #[arg(long = "recompileWrongGoVer")]
    recompile_wrong_go_ver: bool,

    /// Recompile the binary if required, but don't run it
    #[arg(long = "noRun")]
    no_run: bool,

    /// Directory to copy the script and manifests to before building
    #[arg(long = "targetDirBase", value_name = "path", default_value = "/tmp")]
    target_dir_base: PathBuf,

    /// Script to run, followed by arguments forwarded to it
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() {
    let mut argv = vec![env::args().next().unwrap_or_else(|| "gorun".into())];
    if let Ok(extra) = env::var("GORUN_ARGS") {
        argv.extend(extra.split_whitespace().map(String::from));
    }
    argv.extend(env::args().skip(1));

    let cli = Cli::parse_from(argv);

    let filter = if cli.debug { "gorun=debug" } else { "gorun=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    if cli.debug {
        if let Ok(cwd) = env::current_dir() {
            debug!("cwd: {}", cwd.display());
        }
        let envs: Vec<String> = env::vars().map(|(k, v)| format!("{k}={v}")).collect();
        debug!("envs: {}", envs.join(","));
    }

    process::exit(match dispatch(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            1
        }
    });
}

fn dispatch(cli: &Cli) -> Result<i32, LaunchError> {
    let Some(source) = cli.args.first() else {
        let _ = Cli::command().print_help();
        return Ok(1);
    };
    let source_path = real_path(Path::new(source))?;

    if cli.diff {
        if embed::diff(&source_path)? {
            eprintln!("Diffs found");
            return Ok(1);
        }
    } else if cli.extract {
        embed::extract(&source_path)?;
    } else if cli.extract_if_missing {
        embed::extract_if_missing(&source_path)?;
    } else if cli.embed {
        embed::embed(&source_path)?;
    } else {
        let opts = RunOptions {
            clean_days: cli.clean_days,
            debug: cli.debug,
            strict_version: cli.recompile_wrong_go_ver,
            no_run: cli.no_run,
            cache_base: cli.target_dir_base.clone(),
        };
        run_script(&source_path, cli.args.clone(), &opts)?;
    }
    Ok(0)
}
