//! Link resolution through the persistent store, within and across
//! documents.

use crate::common::{fixture_path, registry, settings, temp_store};
use sts_babel::render::MathTextConverter;
use sts_babel::{Artifact, Category, ConversionSpec, Converter};

fn markup(artifact: Artifact) -> String {
    match artifact {
        Artifact::InMemory(markup) => markup,
        Artifact::File(path) => panic!("expected in-memory markup, got {}", path.display()),
    }
}

#[test]
fn links_resolve_within_and_across_documents() {
    let (_dir, store) = temp_store();
    let registry = registry();
    let settings = settings();
    let converter = Converter::new(&registry, &store, &settings, &MathTextConverter);

    converter
        .convert(&ConversionSpec::new("OTHER", fixture_path("other.xml")))
        .expect("convert other");
    let result = converter
        .convert(&ConversionSpec::new("DOC", fixture_path("sample.xml")))
        .expect("convert sample");
    let markup = markup(result.artifact);

    // Forward reference inside the document.
    assert!(markup.contains("[link target=\"sec_2\"]Clause 2[/link]"), "{markup}");
    assert!(markup.contains("[link target=\"fig_2_1\"]Figure 1[/link]"));
    // Encoded href into the other document.
    assert!(markup.contains("[link doc=\"T-OTHER\" target=\"sec_2\"]the other clause[/link]"));
    // Whole-document reference.
    assert!(markup.contains("[link doc=\"T-OTHER\"]OTHER[/link]"));

    // Exactly one warning, for the one dangling reference.
    assert!(markup.contains("[warn key=\"link.unresolved\"]! nothing[/warn]"));
    assert_eq!(result.report.count(Category::UnresolvedReference), 1);
    let unresolved: Vec<_> = result
        .report
        .diagnostics()
        .iter()
        .filter(|d| d.category == Category::UnresolvedReference)
        .collect();
    assert_eq!(unresolved[0].reference, "missing");
}

#[test]
fn cross_document_links_resolve_once_the_target_is_converted() {
    let (_dir, store) = temp_store();
    let registry = registry();
    let settings = settings();
    let converter = Converter::new(&registry, &store, &settings, &MathTextConverter);
    let spec = ConversionSpec::new("DOC", fixture_path("sample.xml"));

    let before = converter.convert(&spec).expect("first run");
    assert!(markup(before.artifact).contains("[warn key=\"link.unresolved-anchor\"]"));
    assert_eq!(before.report.count(Category::UnresolvedReference), 2);

    converter
        .convert(&ConversionSpec::new("OTHER", fixture_path("other.xml")))
        .expect("convert other");
    let after = converter.convert(&spec).expect("second run");
    assert_eq!(after.report.count(Category::UnresolvedReference), 1);
}
