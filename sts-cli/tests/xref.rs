mod common;

use common::{fixture_path, Workspace};
use predicates::prelude::*;

#[test]
fn conversions_populate_the_store() {
    let ws = Workspace::new();
    ws.convert("DOC", "sample.xml");

    ws.cmd()
        .arg("xref")
        .arg("get")
        .arg("sec-1")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"anchorId\": \"sec_1\""))
        .stdout(predicate::str::contains("\"remark\": \"DOC\""));

    ws.cmd()
        .arg("xref")
        .arg("list")
        .arg("--document")
        .arg("DOC")
        .assert()
        .success()
        .stdout(predicate::str::contains("fig-1\tfig_2_1\t"))
        .stdout(predicate::str::contains("o-sec").not());
}

#[test]
fn links_across_documents_resolve_after_both_conversions() {
    let ws = Workspace::new();
    ws.convert("OTHER", "other.xml");
    let markup = ws.convert("DOC", "sample.xml");

    assert!(markup.contains("[link doc=\"T-OTHER\" target=\"sec_2\"]"), "{markup}");
}

#[test]
fn delete_removes_one_entry() {
    let ws = Workspace::new();
    ws.convert("DOC", "sample.xml");

    ws.cmd()
        .arg("xref")
        .arg("delete")
        .arg("sec-1")
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted 'sec-1'"));

    ws.cmd()
        .arg("xref")
        .arg("get")
        .arg("sec-1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No entry"));

    ws.cmd().arg("xref").arg("delete").arg("sec-1").assert().failure();
}

#[test]
fn rebuild_restores_a_document() {
    let ws = Workspace::new();
    ws.convert("DOC", "sample.xml");
    ws.cmd().arg("xref").arg("delete").arg("sec-1").assert().success();

    ws.cmd()
        .arg("xref")
        .arg("rebuild")
        .arg("DOC")
        .arg(fixture_path("sample.xml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Rebuilt 'DOC'"));

    ws.cmd()
        .arg("xref")
        .arg("get")
        .arg("sec-1")
        .assert()
        .success()
        .stdout(predicate::str::contains("sec_1"));
}
