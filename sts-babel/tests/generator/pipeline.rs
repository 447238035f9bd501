//! End-to-end conversions of the sample document.

use crate::common::{fixture_path, registry, settings, temp_store};
use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use sts_babel::render::{DirectoryPublisher, ImageRenderer, MathTextConverter, RenderRequest};
use sts_babel::{Artifact, ConversionSpec, Converter};

fn markup(artifact: Artifact) -> String {
    match artifact {
        Artifact::InMemory(markup) => markup,
        Artifact::File(path) => panic!("expected in-memory markup, got {}", path.display()),
    }
}

#[test]
fn paragraph_around_a_figure_becomes_three_bits() {
    let (_dir, store) = temp_store();
    let registry = registry();
    let settings = settings();
    let converter = Converter::new(&registry, &store, &settings, &MathTextConverter);
    let result = converter
        .convert(&ConversionSpec::new("DOC", fixture_path("sample.xml")))
        .expect("convert");
    let markup = markup(result.artifact);

    let start = markup
        .find("[bit type=\"article-normative\" id=\"sec-2_3\"")
        .expect("first segment");
    let segment: Vec<_> = markup[start..].lines().take(9).collect();
    insta::assert_snapshot!(segment.join("\n"), @r###"
    [bit type="article-normative" id="sec-2_3" parent="sec_2"]
    Text before
    [/bit]
    [bit type="figure" id="fig_2_1" parent="sec_2"]
    [image src="https://assets.example.org/img/overview.png" caption="Figure 1 Overview"]
    [/bit]
    [bit type="article-normative" id="sec-2_3-2" parent="sec_2"]
    text after.
    [/bit]
    "###);
}

#[test]
fn renders_are_pending_without_a_renderer() {
    let (_dir, store) = temp_store();
    let registry = registry();
    let settings = settings();
    let converter = Converter::new(&registry, &store, &settings, &MathTextConverter);
    let result = converter
        .convert(&ConversionSpec::new("DOC", fixture_path("sample.xml")))
        .expect("convert");

    let filenames: Vec<_> = result.pending.iter().map(RenderRequest::filename).collect();
    assert_eq!(filenames, vec!["overview.png", "T-DOC_table-wrap_2_1.png"]);
    assert!(result.assets.is_empty());
    match &result.pending[1] {
        RenderRequest::Table { html, .. } => {
            assert!(html.contains("<span class=\"formula\">x^2</span>"), "{html}");
        }
        other => panic!("expected a table request, got {other:?}"),
    }
}

struct FakeRenderer {
    dir: PathBuf,
    rendered: RefCell<Vec<String>>,
}

impl ImageRenderer for FakeRenderer {
    fn render(&self, html: &str, target_filename: &str) -> sts_babel::error::Result<PathBuf> {
        self.rendered.borrow_mut().push(target_filename.to_string());
        let path = self.dir.join(target_filename);
        fs::write(&path, html)?;
        Ok(path)
    }
}

#[test]
fn render_queue_runs_before_the_output_is_written() {
    let (dir, store) = temp_store();
    let registry = registry();
    let settings = settings();
    let renderer = FakeRenderer {
        dir: dir.path().to_path_buf(),
        rendered: RefCell::new(Vec::new()),
    };
    let publisher =
        DirectoryPublisher::new(dir.path().join("public"), "https://assets.example.org/img")
            .expect("publisher");
    let converter = Converter::new(&registry, &store, &settings, &MathTextConverter)
        .with_renderer(&renderer, &publisher);
    let output = dir.path().join("out").join("doc.txt");
    let result = converter
        .convert(&ConversionSpec::new("DOC", fixture_path("sample.xml")).with_output_path(&output))
        .expect("convert");

    assert_eq!(result.artifact, Artifact::File(output.clone()));
    assert!(output.exists());
    assert_eq!(*renderer.rendered.borrow(), vec!["T-DOC_table-wrap_2_1.png"]);
    assert_eq!(result.assets.len(), 1);
    assert_eq!(
        result.assets[0].url,
        "https://assets.example.org/img/T-DOC_table-wrap_2_1.png"
    );
    assert!(dir.path().join("public/T-DOC_table-wrap_2_1.png").exists());
    // The fixture ships no image for the figure.
    assert!(result
        .report
        .diagnostics()
        .iter()
        .any(|d| d.key == "graphic.missing-file"));
}

#[test]
fn templates_follow_document_parts() {
    let (_dir, store) = temp_store();
    let registry = registry();
    let settings = settings();
    let converter = Converter::new(&registry, &store, &settings, &MathTextConverter);
    let markup = markup(
        converter
            .convert(&ConversionSpec::new("DOC", fixture_path("sample.xml")))
            .expect("convert")
            .artifact,
    );
    assert!(markup.contains("[part name=\"front\" id=\"front\"]"));
    assert!(markup.contains(
        "[bit type=\"title-block\" id=\"title-wrap_1\" parent=\"front\"]\n\
         [title level=\"0\" part=\"intro\"]Information technology[/title]\n\
         [title level=\"0\" part=\"main\"]Sample vocabulary[/title]\n[/bit]"
    ));
    assert!(markup.contains("[bit type=\"article-informative\" id=\"sec_1\" parent=\"front\"]"));
    assert!(markup.contains("[bit type=\"article-normative\" id=\"sec_1\" parent=\"body\"]"));
    assert!(markup.contains("[title level=\"2\"]2.1 Nested[/title]"));
    assert!(markup.contains("[ref id=\"ref_1\"]Some book [1999&#93;[/ref]"));
}
