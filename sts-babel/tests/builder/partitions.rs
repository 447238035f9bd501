//! Partition stream: order, chunking and the JSON codec.

use crate::common::fixture;
use sts_babel::registry::DocumentVariant;
use sts_babel::tree::{replay, BuilderOptions, Partition, PartitionWriter, Tag, TreeBuilder};
use sts_babel::xref::MemoryXrefs;

#[test]
fn written_tree_replays_to_the_same_partitions() {
    let xml = fixture("sample.xml");
    let mut xrefs = MemoryXrefs::new();
    let mut direct = Vec::new();
    TreeBuilder::new(BuilderOptions::new("DOC"), &mut xrefs)
        .build(xml.as_bytes(), &mut direct)
        .expect("build");

    let mut xrefs = MemoryXrefs::new();
    let mut writer = PartitionWriter::new(Vec::new());
    TreeBuilder::new(BuilderOptions::new("DOC").with_resource_dir("./img"), &mut xrefs)
        .build(xml.as_bytes(), &mut writer)
        .expect("build");
    let json = writer.finish().expect("finish");

    let mut replayed: Vec<Partition> = Vec::new();
    let header = replay(json.as_slice(), &mut replayed).expect("replay");
    assert_eq!(header.document_id, "DOC");
    assert_eq!(header.resource_dir, "./img");
    assert_eq!(replayed.len(), direct.len());
    for (a, b) in replayed.iter().zip(&direct) {
        assert_eq!(a.sub_part_id, b.sub_part_id);
        assert_eq!(a.continued, b.continued);
        assert_eq!(a.root.size(), b.root.size());
        assert_eq!(a.root.anchor_id, b.root.anchor_id);
    }
}

#[test]
fn sample_partitions_follow_document_order() {
    let xml = fixture("sample.xml");
    let mut xrefs = MemoryXrefs::new();
    let mut partitions = Vec::new();
    TreeBuilder::new(BuilderOptions::new("DOC"), &mut xrefs)
        .build(xml.as_bytes(), &mut partitions)
        .expect("build");
    let ids: Vec<_> = partitions.iter().map(|p| p.sub_part_id.as_str()).collect();
    assert_eq!(ids, vec!["root", "front", "body", "back"]);
    assert_eq!(partitions[2].root.tag, Tag::Body);
}

#[test]
fn flat_documents_split_first_level_sections() {
    let xml = fixture("sample.xml");
    let mut xrefs = MemoryXrefs::new();
    let mut partitions = Vec::new();
    TreeBuilder::new(
        BuilderOptions::new("FLAT").with_variant(DocumentVariant::Flat),
        &mut xrefs,
    )
    .build(xml.as_bytes(), &mut partitions)
    .expect("build");
    let ids: Vec<_> = partitions.iter().map(|p| p.sub_part_id.as_str()).collect();
    assert_eq!(ids, vec!["root", "front", "body", "sec_1", "sec_2", "back"]);
    // The nested section stays inside its first-level parent.
    let sec_2 = &partitions[4].root;
    assert!(sec_2.find_by_customer_id("sec-2-1").is_some());
}
