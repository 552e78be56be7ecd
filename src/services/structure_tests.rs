use super::*;
use pretty_assertions::assert_eq;

fn paths(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn prefilter_drops_dependency_noise() {
    let input = paths(&[
        "src/main.rs",
        "node_modules/left-pad/index.js",
        "Vendor/lib.go",
        "docs/guide.md",
        "frontend/dist/bundle.js",
        "deep/target/debug/foo",
        ".git/HEAD",
        "builder/keep.rs",
    ]);
    let kept = prefilter(&input);
    assert_eq!(kept, paths(&["src/main.rs", "docs/guide.md", "builder/keep.rs"]));
}

#[test]
fn prefilter_keeps_tests() {
    let input = paths(&["tests/integration.rs", "src/lib.rs"]);
    assert_eq!(prefilter(&input).len(), 2);
}

#[test]
fn profile_buckets_root_files_and_extensionless_names() {
    let profile = profile(&paths(&["README.md", "Makefile", "src/main.rs", ".gitignore"]));
    let dirs: std::collections::HashMap<_, _> = profile.dir_counts.iter().cloned().collect();
    assert_eq!(dirs["(root)"], 3);
    assert_eq!(dirs["src"], 1);

    let types: std::collections::HashMap<_, _> = profile.type_counts.iter().cloned().collect();
    assert_eq!(types["(none)"], 2);
    assert_eq!(types[".md"], 1);
    assert_eq!(types[".rs"], 1);
}

#[test]
fn profile_lowercases_extensions() {
    let profile = profile(&paths(&["a/IMAGE.Md", "b/other.MD"]));
    let types: std::collections::HashMap<_, _> = profile.type_counts.iter().cloned().collect();
    assert_eq!(types[".md"], 2);
}

#[test]
fn profile_truncates_to_top_ten() {
    let mut input = Vec::new();
    for dir in 0..15 {
        // dir N gets N+1 files so counts are distinct.
        for file in 0..=dir {
            input.push(format!("dir{dir:02}/file{file}.x{dir:02}"));
        }
    }
    let profile = profile(&input);
    assert_eq!(profile.dir_counts.len(), 10);
    assert_eq!(profile.type_counts.len(), 10);
    // Largest bucket first.
    assert_eq!(profile.dir_counts[0].0, "dir14");
    assert_eq!(profile.dir_counts[0].1, 15);
}

#[test]
fn summary_renders_both_blocks() {
    let profile = profile(&paths(&["src/main.rs", "src/lib.rs", "README.md"]));
    assert!(profile.summary.starts_with("Top directories:\n"));
    assert!(profile.summary.contains("  src: 2 files\n"));
    assert!(profile.summary.contains("File types:\n"));
    assert!(profile.summary.contains("  .rs: 2\n"));
}

#[test]
fn histogram_ties_break_by_name() {
    let profile = profile(&paths(&["b/one.rs", "a/two.rs"]));
    assert_eq!(profile.dir_counts[0].0, "a");
    assert_eq!(profile.dir_counts[1].0, "b");
}
