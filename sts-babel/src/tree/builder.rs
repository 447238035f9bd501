//! Streaming tree builder
//!
//! Reads the source XML with `quick-xml`, assigns every element its tag,
//! structural path, anchor id and customer id, registers source ids in the
//! cross-reference store and emits self-contained partitions as soon as a
//! partition boundary closes.
//!
//! # Partitions
//!
//!     The root element is the outermost partition. Boundaries nested in it:
//!
//!     - the document parts `front`, `body`, `back` directly under the root
//!     - `sub-part` directly under `body`
//!     - for [`DocumentVariant::Flat`], `sec` directly under `body`
//!
//!     When a boundary opens inside an open partition, the content of the
//!     enclosing partition collected so far is emitted first as a head chunk.
//!     Whatever follows the last nested boundary is emitted when the enclosing
//!     element closes, marked `continued`. Every chunk owns its subtree.
//!
//! # Text
//!
//!     Character data (including decoded entity references and CDATA) is
//!     coalesced until the next markup event, normalised, appended to the
//!     parent's `text` and materialised as a [`Tag::Text`] child.

use super::partition::{Partition, PartitionSink, TreeHeader};
use super::text;
use super::{DocumentPart, Node, NodeId, Tag};
use crate::addressing::{AddressingEngine, StructuralPath};
use crate::error::{ConvertError, Result};
use crate::registry::DocumentVariant;
use crate::report::Report;
use crate::xref::{XrefEntry, XrefWriter};
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::{Decoder, Reader};
use std::io::BufRead;

/// Sub-part id of the partition rooted at the document element.
pub const ROOT_PARTITION: &str = "root";

#[derive(Debug, Clone)]
pub struct BuilderOptions {
    /// External id of the document; recorded as the remark of every store
    /// entry this build registers.
    pub document_id: String,
    pub variant: DocumentVariant,
    pub resource_dir: String,
}

impl BuilderOptions {
    pub fn new(document_id: impl Into<String>) -> Self {
        BuilderOptions {
            document_id: document_id.into(),
            variant: DocumentVariant::default(),
            resource_dir: String::new(),
        }
    }

    pub fn with_variant(mut self, variant: DocumentVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_resource_dir(mut self, resource_dir: impl Into<String>) -> Self {
        self.resource_dir = resource_dir.into();
        self
    }
}

/// An element that has been opened but not closed yet.
#[derive(Debug)]
struct OpenNode {
    node: Node,
    /// Children linked so far; drives customer-id synthesis.
    ordinal: usize,
    boundary: bool,
    /// A head chunk of this partition has already been emitted.
    flushed: bool,
}

/// All per-document builder state. One instance converts one document.
pub struct TreeBuilder<'x> {
    options: BuilderOptions,
    engine: AddressingEngine,
    xrefs: &'x mut dyn XrefWriter,
    report: Report,
    next_id: NodeId,
    structural: StructuralPath,
    open: Vec<OpenNode>,
    pending_text: String,
    partitions: usize,
}

impl<'x> TreeBuilder<'x> {
    pub fn new(options: BuilderOptions, xrefs: &'x mut dyn XrefWriter) -> Self {
        TreeBuilder {
            options,
            engine: AddressingEngine::new(),
            xrefs,
            report: Report::new(),
            next_id: 0,
            structural: StructuralPath::new(),
            open: Vec::new(),
            pending_text: String::new(),
            partitions: 0,
        }
    }

    /// Build from a byte stream, handing partitions to `sink` in document
    /// order. Returns the diagnostics collected while building.
    pub fn build<R: BufRead>(mut self, source: R, sink: &mut dyn PartitionSink) -> Result<Report> {
        sink.begin(&TreeHeader {
            resource_dir: self.options.resource_dir.clone(),
            document_id: self.options.document_id.clone(),
        })?;

        let mut reader = Reader::from_reader(source);
        let decoder = reader.decoder();
        let mut buf = Vec::new();
        loop {
            let position = reader.buffer_position() as u64;
            let event = reader.read_event_into(&mut buf).map_err(|err| ConvertError::Source {
                position,
                message: err.to_string(),
            })?;
            match event {
                Event::Start(start) => {
                    let (name, attributes) = self.element_parts(&start, decoder, position)?;
                    self.open_element(&name, attributes, sink)?;
                }
                Event::Empty(start) => {
                    let (name, attributes) = self.element_parts(&start, decoder, position)?;
                    self.open_element(&name, attributes, sink)?;
                    self.close_element(sink)?;
                }
                Event::End(_) => self.close_element(sink)?,
                Event::Text(raw) => {
                    let raw = utf8(&raw, position)?;
                    self.pending_text.push_str(&raw);
                }
                Event::CData(raw) => {
                    let raw = utf8(&raw, position)?;
                    self.pending_text.push_str(&raw);
                }
                Event::GeneralRef(reference) => self.push_reference(&reference, position)?,
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if let Some(unclosed) = self.open.last() {
            return Err(ConvertError::Source {
                position: reader.buffer_position() as u64,
                message: format!("unexpected end of input inside <{}>", unclosed.node.tag),
            });
        }
        self.flush_xrefs()?;
        tracing::info!(
            document = %self.options.document_id,
            nodes = self.next_id,
            partitions = self.partitions,
            "tree built"
        );
        Ok(self.report)
    }

    fn open_element(
        &mut self,
        name: &str,
        attributes: Vec<(String, String)>,
        sink: &mut dyn PartitionSink,
    ) -> Result<()> {
        self.flush_text(false);

        let tag = Tag::from_element(
            name,
            attributes.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        );

        // Counters are scoped by the ancestors' path; levels include self.
        let anchor_id = if tag.is_level_defining() {
            self.structural.push(tag.clone());
            self.engine.enter_level(&self.structural, &tag)
        } else {
            self.engine.address(&self.structural, &tag)
        };

        let boundary = self.opens_partition(&tag);
        if boundary && !self.open.is_empty() {
            self.emit_head(sink)?;
        }

        let mut node = Node::new(self.next_id, tag);
        self.next_id += 1;
        node.attributes = attributes;
        node.anchor_id = anchor_id;
        node.structural_path = self.structural.clone();
        node.section_level = self.structural.depth();

        let anchors = self.ancestor_anchors();
        node.parent_anchor_id = anchors.last().cloned().unwrap_or_default();

        let parent = self.open.last_mut();
        node.part = DocumentPart::from_tag(&node.tag).or(parent.as_ref().and_then(|p| p.node.part));
        let source_id = node.attr("id").map(str::to_string);
        node.customer_id = match (&source_id, parent) {
            (Some(id), parent) => {
                if let Some(parent) = parent {
                    parent.ordinal += 1;
                }
                id.clone()
            }
            (None, Some(parent)) => {
                parent.ordinal += 1;
                format!("{}_{}", parent.node.customer_id, parent.ordinal)
            }
            (None, None) => self.options.document_id.clone(),
        };

        node.sub_part_id = if self.open.is_empty() {
            ROOT_PARTITION.to_string()
        } else if boundary {
            self.partition_key(&node)
        } else {
            self.open
                .last()
                .map(|p| p.node.sub_part_id.clone())
                .unwrap_or_default()
        };

        if let Some(customer_id) = source_id {
            self.register(&customer_id, &node, &anchors)?;
        }

        self.open.push(OpenNode {
            node,
            ordinal: 0,
            boundary: boundary || self.open.is_empty(),
            flushed: false,
        });
        Ok(())
    }

    fn close_element(&mut self, sink: &mut dyn PartitionSink) -> Result<()> {
        self.flush_text(true);
        let Some(closed) = self.open.pop() else {
            return Ok(());
        };
        if closed.node.tag.is_level_defining() {
            self.structural.pop();
        }

        if closed.boundary {
            if !closed.flushed || !closed.node.children.is_empty() {
                self.emit(
                    sink,
                    Partition {
                        sub_part_id: closed.node.sub_part_id.clone(),
                        continued: closed.flushed,
                        root: closed.node,
                    },
                )?;
            }
            return Ok(());
        }

        if let Some(parent) = self.open.last_mut() {
            parent.node.children.push(closed.node);
        }
        Ok(())
    }

    /// Whether an element with `tag`, opening under the current stack top,
    /// starts a nested partition.
    fn opens_partition(&self, tag: &Tag) -> bool {
        let Some(parent) = self.open.last() else {
            return false;
        };
        if !parent.boundary {
            return false;
        }
        match (&parent.node.tag, tag) {
            (_, part) if part.is_document_part() => self.open.len() == 1,
            (Tag::Body, Tag::SubPart) => true,
            (Tag::Body, Tag::Sec) => self.options.variant == DocumentVariant::Flat,
            _ => false,
        }
    }

    fn partition_key(&self, node: &Node) -> String {
        if !node.anchor_id.is_empty() {
            node.anchor_id.clone()
        } else {
            format!("{}-{}", node.tag, node.id)
        }
    }

    /// Emit what the enclosing partition holds so far as a head chunk.
    fn emit_head(&mut self, sink: &mut dyn PartitionSink) -> Result<()> {
        let Some(parent) = self.open.last_mut() else {
            return Ok(());
        };
        if parent.flushed && parent.node.children.is_empty() {
            return Ok(());
        }
        let mut root = parent.node.clone();
        root.children = std::mem::take(&mut parent.node.children);
        let continued = parent.flushed;
        parent.flushed = true;
        let sub_part_id = root.sub_part_id.clone();
        self.emit(
            sink,
            Partition {
                sub_part_id,
                continued,
                root,
            },
        )
    }

    fn emit(&mut self, sink: &mut dyn PartitionSink, partition: Partition) -> Result<()> {
        self.flush_xrefs()?;
        self.partitions += 1;
        tracing::debug!(
            sub_part = %partition.sub_part_id,
            continued = partition.continued,
            nodes = partition.root.size(),
            "partition ready"
        );
        sink.accept(partition)
    }

    /// Anchor ids of the open ancestors that have one, outermost first.
    fn ancestor_anchors(&self) -> Vec<String> {
        self.open
            .iter()
            .filter(|open| !open.node.anchor_id.is_empty())
            .map(|open| open.node.anchor_id.clone())
            .collect()
    }

    /// Upsert a source id. Unaddressed nodes register under the nearest
    /// addressed ancestor so links to them still land somewhere meaningful.
    fn register(&mut self, customer_id: &str, node: &Node, anchors: &[String]) -> Result<()> {
        let (anchor_id, parent_anchor_id) = if !node.anchor_id.is_empty() {
            (node.anchor_id.clone(), node.parent_anchor_id.clone())
        } else {
            match anchors {
                [] => {
                    tracing::debug!(customer_id, "no addressed ancestor, not registered");
                    return Ok(());
                }
                [only] => (only.clone(), String::new()),
                [.., grand, parent] => (parent.clone(), grand.clone()),
            }
        };
        self.xrefs.put(
            customer_id,
            XrefEntry::new(anchor_id, parent_anchor_id, self.options.document_id.clone()),
        )?;
        Ok(())
    }

    fn element_parts(
        &mut self,
        start: &BytesStart,
        decoder: Decoder,
        position: u64,
    ) -> Result<(String, Vec<(String, String)>)> {
        let name = utf8(start.name().as_ref(), position)?;
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|err| ConvertError::Source {
                position,
                message: err.to_string(),
            })?;
            let key = utf8(attribute.key.as_ref(), position)?;
            let value = match attribute.decode_and_unescape_value(decoder) {
                Ok(value) => value.into_owned(),
                Err(err) => {
                    self.report
                        .structural("entity.unknown", format!("{name}/@{key}: {err}"));
                    utf8(&attribute.value, position)?
                }
            };
            attributes.push((key, value));
        }
        Ok((name, attributes))
    }

    /// Predefined and numeric references resolve; anything else stays
    /// literal and is reported.
    fn push_reference(&mut self, reference: &BytesRef, position: u64) -> Result<()> {
        let name = reference.decode().map_err(|err| ConvertError::Source {
            position,
            message: err.to_string(),
        })?;
        let resolved = match reference.resolve_char_ref() {
            Ok(Some(ch)) => Some(ch.to_string()),
            Ok(None) => resolve_predefined_entity(&name).map(str::to_string),
            Err(_) => None,
        };
        match resolved {
            Some(text) => self.pending_text.push_str(&text),
            None => {
                self.report.structural("entity.unknown", format!("&{name};"));
                self.pending_text.push_str(&format!("&{name};"));
            }
        }
        Ok(())
    }

    fn flush_xrefs(&mut self) -> Result<()> {
        for (customer_id, outcome) in self.xrefs.flush()? {
            if let Some(kept) = outcome.conflict {
                self.report.duplicate(
                    "xref.conflict",
                    format!("{customer_id}: kept {kept}"),
                );
            }
        }
        Ok(())
    }

    /// Materialise pending character data. `closing` is set when the run
    /// ends at the parent's end tag.
    fn flush_text(&mut self, closing: bool) {
        if self.pending_text.is_empty() {
            return;
        }
        let raw = std::mem::take(&mut self.pending_text);
        let id = self.next_id;
        let Some(parent) = self.open.last_mut() else {
            return;
        };
        let normalized = if text::is_layout_whitespace(&raw) {
            // Between two children of mixed content a line break still
            // separates words; leading and trailing runs are indentation.
            let between = !closing && !parent.node.children.is_empty();
            if !(between && parent.node.tag.holds_mixed_content()) {
                return;
            }
            " ".to_string()
        } else {
            text::normalize(&raw)
        };
        if normalized.is_empty() {
            return;
        }
        self.next_id += 1;
        parent.ordinal += 1;
        parent.node.text.push_str(&normalized);

        let mut fragment = Node::text_fragment(id, normalized);
        fragment.customer_id = format!("{}_{}", parent.node.customer_id, parent.ordinal);
        fragment.parent_anchor_id = if parent.node.anchor_id.is_empty() {
            parent.node.parent_anchor_id.clone()
        } else {
            parent.node.anchor_id.clone()
        };
        fragment.part = parent.node.part;
        fragment.sub_part_id = parent.node.sub_part_id.clone();
        fragment.section_level = parent.node.section_level;
        parent.node.children.push(fragment);
    }
}

fn utf8(bytes: &[u8], position: u64) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|err| ConvertError::Source {
        position,
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xref::MemoryXrefs;

    fn build(xml: &str, variant: DocumentVariant) -> (Vec<Partition>, MemoryXrefs, Report) {
        let mut xrefs = MemoryXrefs::new();
        let mut partitions = Vec::new();
        let report = TreeBuilder::new(BuilderOptions::new("DOC").with_variant(variant), &mut xrefs)
            .build(xml.as_bytes(), &mut partitions)
            .unwrap();
        (partitions, xrefs, report)
    }

    fn ids(partitions: &[Partition]) -> Vec<(&str, bool)> {
        partitions
            .iter()
            .map(|p| (p.sub_part_id.as_str(), p.continued))
            .collect()
    }

    #[test]
    fn addresses_title_wrap_in_front() {
        let xml = r#"<standard><front><title-wrap id="tw"><main>Title</main></title-wrap></front></standard>"#;
        let (partitions, xrefs, _) = build(xml, DocumentVariant::SubParts);
        let front = partitions.iter().find(|p| p.sub_part_id == "front").unwrap();
        assert_eq!(front.root.children[0].anchor_id, "title-wrap_1");
        assert_eq!(xrefs.entries()["tw"].anchor_id, "title-wrap_1");
        assert_eq!(xrefs.entries()["tw"].remark, "DOC");
    }

    #[test]
    fn addresses_tables_under_a_section() {
        let xml = r#"<standard><body><sec id="s1"><table-wrap id="t1"/><table-wrap id="t2"/></sec></body></standard>"#;
        let (_, xrefs, _) = build(xml, DocumentVariant::SubParts);
        assert_eq!(xrefs.entries()["s1"].anchor_id, "sec_1");
        assert_eq!(xrefs.entries()["t1"].anchor_id, "table-wrap_1_1");
        assert_eq!(xrefs.entries()["t2"].anchor_id, "table-wrap_1_2");
        assert_eq!(xrefs.entries()["t2"].parent_anchor_id, "sec_1");
    }

    #[test]
    fn partitions_parts_in_document_order() {
        let xml = "<standard><front/><body><sec/></body><back/></standard>";
        let (partitions, _, _) = build(xml, DocumentVariant::SubParts);
        assert_eq!(
            ids(&partitions),
            vec![("root", false), ("front", false), ("body", false), ("back", false)]
        );
    }

    #[test]
    fn sub_parts_split_the_body() {
        let xml = "<standard><body><sec/><sub-part><sec/></sub-part><sub-part/><p>tail</p></body></standard>";
        let (partitions, _, _) = build(xml, DocumentVariant::SubParts);
        assert_eq!(
            ids(&partitions)[1..],
            [
                ("body", false),
                ("sub-part_1", false),
                ("sub-part_2", false),
                ("body", true)
            ]
        );
        let head = &partitions[1].root;
        assert_eq!(head.children.len(), 1);
        assert_eq!(head.children[0].tag, Tag::Sec);
        let tail = &partitions[4].root;
        assert_eq!(tail.children[0].tag, Tag::P);
    }

    #[test]
    fn flat_variant_splits_first_level_sections() {
        let xml = "<standard><body><sec><sec/></sec><sec/></body></standard>";
        let (partitions, _, _) = build(xml, DocumentVariant::Flat);
        assert_eq!(
            ids(&partitions)[1..],
            [("body", false), ("sec_1", false), ("sec_2", false)]
        );
        assert_eq!(partitions[2].root.children.len(), 1);
    }

    #[test]
    fn synthesizes_customer_ids_from_parent_and_ordinal() {
        let xml = r#"<standard><body><sec id="s1"><title>T</title><p>one</p></sec></body></standard>"#;
        let (partitions, _, _) = build(xml, DocumentVariant::SubParts);
        let body = partitions.iter().find(|p| p.sub_part_id == "body").unwrap();
        let sec = &body.root.children[0];
        assert_eq!(sec.customer_id, "s1");
        assert_eq!(sec.children[0].customer_id, "s1_1");
        assert_eq!(sec.children[1].customer_id, "s1_2");
        assert_eq!(sec.children[1].children[0].customer_id, "s1_2_1");
    }

    #[test]
    fn normalizes_and_materializes_text() {
        let xml = "<standard><body><p>a &amp; b\n        c<bold>x</bold></p></body></standard>";
        let (partitions, _, _) = build(xml, DocumentVariant::SubParts);
        let body = partitions.iter().find(|p| p.sub_part_id == "body").unwrap();
        let p = &body.root.children[0];
        assert_eq!(p.text, "a & b c");
        assert_eq!(p.children[0].tag, Tag::Text);
        assert_eq!(p.children[0].text, "a & b c");
        assert_eq!(p.children[1].tag, Tag::Bold);
    }

    #[test]
    fn line_break_between_inline_children_separates_words() {
        let xml = "<standard><body><p>\n  <bold>word</bold>\n    <italic>next</italic>\n</p>\n</body></standard>";
        let (partitions, _, _) = build(xml, DocumentVariant::SubParts);
        let body = partitions.iter().find(|p| p.sub_part_id == "body").unwrap();
        assert_eq!(body.root.children.len(), 1);
        let p = &body.root.children[0];
        let tags: Vec<_> = p.children.iter().map(|c| c.tag.clone()).collect();
        assert_eq!(tags, vec![Tag::Bold, Tag::Text, Tag::Italic]);
        assert_eq!(p.children[1].text, " ");
        assert_eq!(p.plain_text(), "word next");
    }

    #[test]
    fn content_ids_register_under_nearest_anchor() {
        let xml = r#"<standard><body><sec id="s1"><p id="p1">x</p></sec></body></standard>"#;
        let (_, xrefs, _) = build(xml, DocumentVariant::SubParts);
        let entry = &xrefs.entries()["p1"];
        assert_eq!(entry.anchor_id, "sec_1");
        assert_eq!(entry.parent_anchor_id, "body");
    }

    #[test]
    fn duplicate_ids_are_reported_and_first_wins() {
        let xml = r#"<standard><body><sec id="dup"/><sec id="dup"/></body></standard>"#;
        let (_, xrefs, report) = build(xml, DocumentVariant::SubParts);
        assert_eq!(xrefs.entries()["dup"].anchor_id, "sec_1");
        assert_eq!(report.count(crate::report::Category::DuplicateIdentifier), 1);
    }

    #[test]
    fn remaps_are_applied() {
        let xml = r#"<standard><body><sec sec-type="paragraph" id="sp"/></body></standard>"#;
        let (_, xrefs, _) = build(xml, DocumentVariant::SubParts);
        assert_eq!(xrefs.entries()["sp"].anchor_id, "sec-paragraph_1");
    }

    #[test]
    fn malformed_input_is_fatal() {
        let mut xrefs = MemoryXrefs::new();
        let mut partitions = Vec::new();
        let err = TreeBuilder::new(BuilderOptions::new("DOC"), &mut xrefs)
            .build("<standard><body></sec></standard>".as_bytes(), &mut partitions)
            .unwrap_err();
        assert!(matches!(err, ConvertError::Source { .. }));

        let err = TreeBuilder::new(BuilderOptions::new("DOC"), &mut xrefs)
            .build("<standard><body>".as_bytes(), &mut partitions)
            .unwrap_err();
        assert!(matches!(err, ConvertError::Source { .. }));
    }

    #[test]
    fn decodes_attribute_entities() {
        let xml = r#"<standard><body><sec id="a&amp;b&#x41;&#66;"/></body></standard>"#;
        let (_, xrefs, report) = build(xml, DocumentVariant::SubParts);
        assert_eq!(xrefs.entries()["a&bAB"].anchor_id, "sec_1");
        assert!(report.is_empty());
    }

    #[test]
    fn unknown_entities_stay_literal_and_are_reported() {
        let xml = r#"<standard><body><sec id="s&nbsp;"><p>a&nbsp;b &#x41;</p></sec></body></standard>"#;
        let (partitions, xrefs, report) = build(xml, DocumentVariant::SubParts);
        assert!(xrefs.entries().contains_key("s&nbsp;"));
        let para = partitions[0]
            .root
            .find(&|n: &Node| n.tag == Tag::P)
            .expect("paragraph");
        assert_eq!(para.plain_text(), "a&nbsp;b A");
        assert_eq!(report.count(crate::report::Category::Structural), 2);
    }
}
