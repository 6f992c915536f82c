//! Staging assembler: tree mirroring, manifest materialisation, shebang
//! handling, and the modes the staged tree is created with.

mod common;

use std::fs;
use std::os::unix::fs::symlink;
use std::path::PathBuf;

use tempfile::TempDir;

use gorun::{rebase, stage, CacheLayout, Script, StageError};

fn setup() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = common::canonical_tempdir(&tmp);
    (tmp, root)
}

fn layout_for(script: &Script, root: &std::path::Path) -> CacheLayout {
    CacheLayout::derive_with(script, &root.join("cache"), "testbox", 1000, 4242)
}

#[test]
fn stage_mirrors_source_extra_dir_and_manifests() {
    let (_tmp, root) = setup();
    let content = "\
// go.mod >>>
// :module demo
// :go 1.24.0
// <<< go.mod

package main

func main() {}
";
    let source = root.join("tool.go");
    fs::write(&source, content).unwrap();
    fs::write(root.join("go.sum"), "demo v1.0.0 h1:abc=\n").unwrap();

    let extra = root.join("tool_");
    fs::create_dir_all(extra.join("internal")).unwrap();
    fs::write(extra.join("internal/helper.go"), "package main\n").unwrap();

    let script = Script::resolve(&source, vec![]).unwrap();
    let layout = layout_for(&script, &root);
    stage(&script, &layout).unwrap();

    // the source lands at its mirrored location
    let staged_source = layout.staging_dir.join("tool.go");
    assert_eq!(common::read(&staged_source), content);
    assert_eq!(common::mode_of(&staged_source), 0o600);
    assert_eq!(common::mode_of(&layout.staging_dir), 0o700);

    // the auxiliary directory is mirrored recursively
    let mirrored = rebase(&layout.invocation_root, &extra);
    assert_eq!(
        common::read(&mirrored.join("internal/helper.go")),
        "package main\n"
    );

    // embedded section wins for go.mod; decoding keeps a leading newline
    assert_eq!(
        common::read(&layout.staging_dir.join("go.mod")),
        "\nmodule demo\ngo 1.24.0\n"
    );

    // go.sum has no section and falls back to the file beside the script
    assert_eq!(
        common::read(&layout.staging_dir.join("go.sum")),
        "demo v1.0.0 h1:abc=\n"
    );

    // go.work exists on neither side and is simply skipped
    assert!(!layout.staging_dir.join("go.work").exists());
}

#[test]
fn shebang_is_rewritten_and_go_suffix_added() {
    let (_tmp, root) = setup();
    let content = "#!/usr/bin/env gorun\npackage main\n\nfunc main() {}\n";
    let source = root.join("tool");
    fs::write(&source, content).unwrap();

    let script = Script::resolve(&source, vec![]).unwrap();
    let layout = layout_for(&script, &root);
    stage(&script, &layout).unwrap();

    let staged = common::read(&layout.staging_dir.join("tool.go"));
    // only the two shebang bytes are rewritten, so `#!/` becomes `///`
    assert!(staged.starts_with("///usr/bin/env gorun\n"));
    assert_eq!(&staged[2..], &content[2..]);

    // the script on disk is untouched
    assert_eq!(common::read(&source), content);
    assert_eq!(layout.binary.file_name().unwrap(), "tool.bin");
}

#[test]
fn workspace_sibling_is_mirrored() {
    let (_tmp, root) = setup();
    let proj = root.join("proj");
    let shared = root.join("shared");
    fs::create_dir_all(&proj).unwrap();
    fs::create_dir_all(&shared).unwrap();
    fs::write(shared.join("go.mod"), "module shared\n").unwrap();
    fs::write(shared.join("lib.go"), "package shared\n").unwrap();

    let content = "\
// go.work >>>
// :go 1.24.0
// :
// :use (
// :\t.
// :\t../shared
// :)
// <<< go.work

package main

func main() {}
";
    let source = proj.join("tool.go");
    fs::write(&source, content).unwrap();

    let script = Script::resolve(&source, vec![]).unwrap();
    assert_eq!(script.work_dirs, vec![shared.clone()]);

    let layout = layout_for(&script, &root);
    stage(&script, &layout).unwrap();

    let mirrored = rebase(&layout.invocation_root, &shared);
    assert_eq!(common::read(&mirrored.join("lib.go")), "package shared\n");
    // the embedded workspace manifest is staged beside the source
    assert!(layout.staging_dir.join("go.work").exists());
}

#[test]
fn non_regular_files_fail_the_stage() {
    let (_tmp, root) = setup();
    let source = root.join("tool.go");
    fs::write(&source, "package main\n").unwrap();

    let extra = root.join("tool_");
    fs::create_dir(&extra).unwrap();
    symlink("/etc/hosts", extra.join("hosts")).unwrap();

    let script = Script::resolve(&source, vec![]).unwrap();
    let layout = layout_for(&script, &root);

    assert!(matches!(
        stage(&script, &layout),
        Err(StageError::UnsupportedEntry { .. })
    ));
}

#[test]
fn restaging_replaces_leftovers_from_a_crashed_run() {
    let (_tmp, root) = setup();
    let source = root.join("tool.go");
    fs::write(&source, "package main\n").unwrap();

    let script = Script::resolve(&source, vec![]).unwrap();
    let layout = layout_for(&script, &root);

    fs::create_dir_all(&layout.invocation_root).unwrap();
    fs::write(layout.invocation_root.join("debris"), "old").unwrap();

    stage(&script, &layout).unwrap();
    assert!(!layout.invocation_root.join("debris").exists());
    assert!(layout.staging_dir.join("tool.go").exists());
}
