//! Building the same input twice yields the same tree and the same store.

use crate::common::{fixture, temp_store};
use sts_babel::tree::{BuilderOptions, Partition, PartitionWriter, TreeBuilder};
use sts_babel::xref::{MemoryXrefs, StoreBatch};

fn build(xml: &str) -> (Vec<Partition>, MemoryXrefs) {
    let mut xrefs = MemoryXrefs::new();
    let mut partitions = Vec::new();
    TreeBuilder::new(BuilderOptions::new("DOC"), &mut xrefs)
        .build(xml.as_bytes(), &mut partitions)
        .expect("build");
    (partitions, xrefs)
}

#[test]
fn repeated_builds_are_identical() {
    let xml = fixture("sample.xml");
    let (first, first_xrefs) = build(&xml);
    let (second, second_xrefs) = build(&xml);
    assert_eq!(first, second);
    assert_eq!(first_xrefs.entries(), second_xrefs.entries());
}

#[test]
fn serialized_trees_are_byte_identical() {
    let xml = fixture("sample.xml");
    let dump = || {
        let mut xrefs = MemoryXrefs::new();
        let mut writer = PartitionWriter::new(Vec::new());
        TreeBuilder::new(BuilderOptions::new("DOC").with_resource_dir("./img"), &mut xrefs)
            .build(xml.as_bytes(), &mut writer)
            .expect("build");
        writer.finish().expect("finish")
    };
    assert_eq!(dump(), dump());
}

#[test]
fn persistent_store_matches_memory_store() {
    let xml = fixture("sample.xml");
    let (_, memory) = build(&xml);

    let (_dir, store) = temp_store();
    let mut batch = StoreBatch::new(&store);
    let mut partitions = Vec::new();
    TreeBuilder::new(BuilderOptions::new("DOC"), &mut batch)
        .build(xml.as_bytes(), &mut partitions)
        .expect("build");
    assert_eq!(batch.pending(), 0);
    assert_eq!(&store.get_all().expect("read store"), memory.entries());
}

#[test]
fn sample_addresses() {
    let (_, xrefs) = build(&fixture("sample.xml"));
    let anchor = |id: &str| xrefs.entries()[id].anchor_id.clone();
    assert_eq!(anchor("tw"), "title-wrap_1");
    assert_eq!(anchor("sec-1"), "sec_1");
    assert_eq!(anchor("sec-2-1"), "sec_2-1");
    assert_eq!(anchor("fig-1"), "fig_2_1");
    assert_eq!(anchor("tab-1"), "table-wrap_2_1");
    assert_eq!(anchor("bib"), "ref-list_1");
    assert_eq!(anchor("r1"), "ref_1");
    assert_eq!(xrefs.entries()["r1"].parent_anchor_id, "ref-list_1");
    // Unaddressed paragraph: nearest addressed ancestor.
    assert_eq!(anchor("p-scope"), "sec_1");
}
