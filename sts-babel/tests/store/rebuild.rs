//! Scoped rebuilds touch only the rebuilt document's entries.

use crate::common::{fixture_path, registry, settings, temp_store};
use std::collections::BTreeMap;
use std::fs;
use sts_babel::render::MathTextConverter;
use sts_babel::{Artifact, Category, ConversionSpec, Converter, XrefEntry};

fn owned_by(entries: &BTreeMap<String, XrefEntry>, document: &str) -> BTreeMap<String, XrefEntry> {
    entries
        .iter()
        .filter(|(_, entry)| entry.remark == document)
        .map(|(key, entry)| (key.clone(), entry.clone()))
        .collect()
}

#[test]
fn rebuild_leaves_other_documents_untouched() {
    let (_dir, store) = temp_store();
    let registry = registry();
    let settings = settings();
    let converter = Converter::new(&registry, &store, &settings, &MathTextConverter);
    converter
        .convert(&ConversionSpec::new("OTHER", fixture_path("other.xml")))
        .unwrap();
    converter
        .convert(&ConversionSpec::new("DOC", fixture_path("sample.xml")))
        .unwrap();

    let before = store.get_all().unwrap();
    let result = converter
        .rebuild_xrefs("DOC", &fixture_path("sample.xml"))
        .unwrap();
    let after = store.get_all().unwrap();

    assert_eq!(result.removed, owned_by(&before, "DOC").len());
    for (key, entry) in owned_by(&before, "OTHER") {
        assert_eq!(after.get(&key), Some(&entry), "{key}");
    }
    assert_eq!(owned_by(&after, "DOC"), owned_by(&before, "DOC"));
}

#[test]
fn rebuild_of_a_document_sharing_ids_keeps_the_first_owner() {
    let (dir, store) = temp_store();
    let registry = registry();
    let settings = settings();
    let first = dir.path().join("first.xml");
    let second = dir.path().join("second.xml");
    let tree = dir.path().join("first.tree.json");
    let source = r#"<standard><body><sec id="sec_1"><title>Scope</title><p>see <xref ref-type="sec" rid="sec_1">1</xref></p></sec></body></standard>"#;
    fs::write(&first, source).unwrap();
    fs::write(&second, source.replace("</body>", "<sec id=\"tail\"/></body>")).unwrap();

    let converter = Converter::new(&registry, &store, &settings, &MathTextConverter);
    converter
        .convert(&ConversionSpec::new("DOC", &first).with_tree_dump(&tree))
        .unwrap();
    let before = store.get_all().unwrap();
    let rebuilt = converter.rebuild_xrefs("OTHER", &second).unwrap();
    let after = store.get_all().unwrap();

    assert_eq!(rebuilt.report.count(Category::DuplicateIdentifier), 1);
    for (key, entry) in owned_by(&before, "DOC") {
        assert_eq!(after.get(&key), Some(&entry), "{key}");
    }
    assert_eq!(after["sec_1"].remark, "DOC");
    assert_eq!(after["tail"].remark, "OTHER");

    let rendered = converter.render_tree("DOC", &tree, None).unwrap();
    let Artifact::InMemory(markup) = rendered.artifact else {
        panic!("expected in-memory markup");
    };
    assert!(markup.contains(r#"[link target="sec_1"]1[/link]"#), "{markup}");
    assert!(!markup.contains("link.foreign-target"), "{markup}");
    assert_eq!(rendered.report.count(Category::UnresolvedReference), 0);
}

#[test]
fn rebuild_drops_ids_that_left_the_source() {
    let (_dir, store) = temp_store();
    let registry = registry();
    let settings = settings();
    store
        .put("retired-id", XrefEntry::new("sec_9", "body", "DOC"))
        .unwrap();
    let converter = Converter::new(&registry, &store, &settings, &MathTextConverter);
    converter
        .rebuild_xrefs("DOC", &fixture_path("sample.xml"))
        .unwrap();
    let entries = store.get_all().unwrap();
    assert!(!entries.contains_key("retired-id"));
    assert_eq!(entries["sec-2-1"].anchor_id, "sec_2-1");
}

#[test]
fn rebuild_requires_a_registered_document() {
    let (_dir, store) = temp_store();
    let registry = registry();
    let settings = settings();
    let converter = Converter::new(&registry, &store, &settings, &MathTextConverter);
    assert!(converter
        .rebuild_xrefs("UNKNOWN", &fixture_path("sample.xml"))
        .is_err());
}
