mod common;

use common::{fixture_path, Workspace};
use predicates::prelude::*;

#[test]
fn tree_then_render_matches_a_direct_conversion() {
    let ws = Workspace::new();
    let tree = ws.path("work/doc.tree.json");

    ws.cmd()
        .arg("tree")
        .arg("DOC")
        .arg(fixture_path("sample.xml"))
        .arg(&tree)
        .assert()
        .success()
        .stdout(predicate::str::contains("Tree written to"));
    assert!(tree.exists());

    let rendered = ws
        .cmd()
        .arg("render")
        .arg("DOC")
        .arg(&tree)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let direct = ws.convert("DOC", "sample.xml");
    assert_eq!(String::from_utf8(rendered).unwrap(), direct);
}

#[test]
fn convert_can_keep_its_tree() {
    let ws = Workspace::new();
    let tree = ws.path("doc.tree.json");

    let converted = ws
        .cmd()
        .arg("convert")
        .arg("DOC")
        .arg(fixture_path("sample.xml"))
        .arg("--tree-dump")
        .arg(&tree)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    ws.cmd()
        .arg("render")
        .arg("DOC")
        .arg(&tree)
        .assert()
        .success()
        .stdout(converted);
}
