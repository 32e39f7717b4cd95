use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn gophr(cwd: &Path, args: &[&str]) -> Output {
    return Command::new(env!("CARGO_BIN_EXE_gophr"))
        .current_dir(cwd)
        .args(args)
        .output()
        .unwrap();
}

fn stdout(output: &Output) -> String {
    return String::from_utf8_lossy(&output.stdout).into_owned();
}

fn stderr(output: &Output) -> String {
    return String::from_utf8_lossy(&output.stderr).into_owned();
}

fn pkt(line: &str) -> String {
    return format!("{:04x}{line}", line.len() + 4);
}

fn hash(n: u8) -> String {
    return format!("{n}").repeat(40);
}

/// A small advertisement: HEAD on master, two tags, one unstable branch.
fn advertisement() -> String {
    let mut refs = pkt("# service=git-upload-pack\n");
    refs.push_str("0000");
    refs.push_str(&pkt(&format!("{} HEAD\0multi_ack symref=HEAD:refs/heads/master\n", hash(1))));
    refs.push_str(&pkt(&format!("{} refs/heads/master\n", hash(1))));
    refs.push_str(&pkt(&format!("{} refs/heads/v1.3-unstable\n", hash(2))));
    refs.push_str(&pkt(&format!("{} refs/tags/v1.2.0\n", hash(3))));
    refs.push_str(&pkt(&format!("{} refs/tags/v1.2.4\n", hash(4))));
    refs.push_str("0000");
    return refs;
}

#[test]
fn refs_lists_candidates() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("refs.bin"), advertisement()).unwrap();

    let output = gophr(dir.path(), &["refs", "refs.bin"]);
    assert!(output.status.success(), "refs failed: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains(&format!("1.2.0 {} refs/tags/v1.2.0", hash(3))), "{text}");
    assert!(text.contains(&format!("1.3.0-unstable {} refs/heads/v1.3-unstable", hash(2))), "{text}");

    let json = gophr(dir.path(), &["refs", "refs.bin", "--json"]);
    assert!(json.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&json.stdout).unwrap();
    assert_eq!(parsed.as_array().map(Vec::len), Some(3));
}

#[test]
fn refs_select_rewrites_head() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("refs.bin"), advertisement()).unwrap();

    let output = gophr(dir.path(), &["refs", "refs.bin", "--select", "v1-unstable"]);
    assert!(output.status.success(), "refs failed: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains(&format!(
        "{} HEAD\0symref=HEAD:refs/heads/v1.3-unstable multi_ack oldref=HEAD:refs/heads/master\n",
        hash(2)
    )));
    assert!(text.contains(&format!("{} refs/heads/master\n", hash(2))));
    assert!(text.ends_with("0000"));
}

#[test]
fn refs_select_without_match_fails() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("refs.bin"), advertisement()).unwrap();

    let output = gophr(dir.path(), &["refs", "refs.bin", "--select", "3.x"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("no version matching 3.x"), "{}", stderr(&output));
}

#[test]
fn match_reports_each_version_and_the_best() {
    let dir = tempfile::tempdir().unwrap();
    let output = gophr(dir.path(), &["match", "1.x", "v1.2.0", "1.3.5", "2.0.0"]);
    assert!(output.status.success(), "match failed: {}", stderr(&output));
    assert_eq!(stdout(&output), "v1.2.0: match\n1.3.5: match\n2.0.0: no match\nbest: 1.3.5\n");

    let none = gophr(dir.path(), &["match", "3.x", "1.0.0"]);
    assert_eq!(none.status.code(), Some(1));
    assert_eq!(stdout(&none), "1.0.0: no match\n");

    let bad = gophr(dir.path(), &["match", "^1.x", "1.0.0"]);
    assert_eq!(bad.status.code(), Some(1));
    assert!(stderr(&bad).contains("version prefixes cannot be mixed with version wildcards"));
}

const PINS: &str = r#"[[pins]]
author = "a"
repo = "lib"
default_sha = "libhead"

[[pins.commits]]
sha = "lib2016"
date = "2016-05-01T00:00:00Z"

[[pins.commits]]
sha = "lib2018"
date = "2018-05-01T00:00:00Z"
"#;

#[test]
fn pin_then_digest() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("main.go"), "package main\n\nimport \"github.com/a/lib\"\n").unwrap();
    fs::write(dir.path().join("gophr.pins.toml"), PINS).unwrap();
    let root = dir.path().to_str().unwrap();

    let output = gophr(
        dir.path(),
        &["pin", root, "--author", "me", "--repo", "app", "--sha", "abc", "--date", "2017-01-01T00:00:00Z"],
    );
    assert!(output.status.success(), "pin failed: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("patched 1 file(s), pinned 1 import(s), missed 0 import(s)"), "{text}");
    assert!(text.contains("resolved a/lib -> lib2016"), "{text}");
    assert_eq!(
        fs::read_to_string(dir.path().join("main.go")).unwrap(),
        "package main\n\nimport \"gophr.pm/a/lib@lib2016\"\n"
    );

    let digest = gophr(dir.path(), &["digest", root]);
    assert!(digest.status.success());
    let digest = stdout(&digest);
    assert!(text.contains(&format!("digest: {}", digest.trim())), "{text}");
}

#[test]
fn pin_fails_on_unknown_dependency() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("main.go"), "package main\n\nimport \"github.com/z/gone\"\n").unwrap();
    let pins = dir.path().join("elsewhere.toml");
    fs::write(&pins, PINS).unwrap();
    let root = dir.path().to_str().unwrap();

    let output = gophr(
        dir.path(),
        &[
            "pin",
            root,
            "--author",
            "me",
            "--repo",
            "app",
            "--sha",
            "abc",
            "--date",
            "2017-01-01T00:00:00Z",
            "--pins",
            pins.to_str().unwrap(),
        ],
    );
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("z/gone was not found upstream"), "{}", stderr(&output));
}
