//! Flattening of complex tables into standalone HTML fragments.
//!
//! The fragment is built as an `RcDom` and serialised with html5ever, so
//! markup in cell content is always well-formed. Private-use characters are
//! wrapped in a marker span (fonts on the render host rarely cover them) and
//! formulas are converted to text on the spot.

use crate::error::{ConvertError, Result};
use crate::render::{math_fragment, FormulaConverter};
use crate::report::Report;
use crate::tree::{Node, Tag};
use html5ever::{
    ns, serialize, serialize::SerializeOpts, serialize::TraversalScope, Attribute, LocalName,
    QualName,
};
use markup5ever_rcdom::{Handle, Node as DomNode, NodeData, SerializableHandle};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

const PASSTHROUGH_ELEMENTS: &[&str] = &[
    "table", "thead", "tbody", "tfoot", "tr", "th", "td", "col", "colgroup", "caption", "br",
    "hr",
];

const PASSTHROUGH_ATTRIBUTES: &[&str] = &[
    "colspan", "rowspan", "align", "valign", "width", "style", "scope", "border", "frame",
    "rules", "char",
];

/// Flatten a `table-wrap` (or a bare `table`) into an HTML fragment.
pub fn flatten(node: &Node, formulas: &dyn FormulaConverter, report: &mut Report) -> Result<String> {
    let container = create_element("div", vec![("class", "table-wrap")]);
    let mut flattener = Flattener { formulas, report };

    if node.tag == Tag::TableWrap {
        for child in &node.children {
            match child.tag {
                Tag::Label | Tag::Caption => {
                    let caption = create_element("div", vec![("class", "table-caption")]);
                    flattener.children(child, &caption);
                    append(&container, caption);
                }
                Tag::TableWrapFoot => {
                    let foot = create_element("div", vec![("class", "table-foot")]);
                    flattener.children(child, &foot);
                    append(&container, foot);
                }
                Tag::Text => {}
                _ => flattener.node(child, &container),
            }
        }
    } else {
        flattener.node(node, &container);
    }

    serialize_fragment(&container)
}

/// Deterministic image file name for a table.
pub fn image_filename(target_id: &str, table: &Node, extension: &str) -> String {
    let key = if table.anchor_id.is_empty() {
        &table.customer_id
    } else {
        &table.anchor_id
    };
    format!("{}_{}.{}", sanitize(target_id), sanitize(key), extension)
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

struct Flattener<'a> {
    formulas: &'a dyn FormulaConverter,
    report: &'a mut Report,
}

impl Flattener<'_> {
    fn node(&mut self, node: &Node, parent: &Handle) {
        match &node.tag {
            Tag::Text => append_text(parent, &node.text),
            Tag::Math => {
                let span = create_element("span", vec![("class", "formula")]);
                append_text(&span, &self.formula(node));
                append(parent, span);
            }
            Tag::InlineFormula => match node.child(&Tag::Math) {
                Some(math) => self.node(math, parent),
                None => self.children(node, parent),
            },
            Tag::Graphic | Tag::InlineGraphic => {}
            tag => {
                let name = html_name(tag);
                let attributes: Vec<(&str, &str)> = node
                    .attributes
                    .iter()
                    .filter(|(key, _)| PASSTHROUGH_ATTRIBUTES.contains(&key.as_str()))
                    .map(|(key, value)| (key.as_str(), value.as_str()))
                    .collect();
                let element = create_element(name, attributes);
                self.children(node, &element);
                append(parent, element);
            }
        }
    }

    fn children(&mut self, node: &Node, parent: &Handle) {
        for child in &node.children {
            self.node(child, parent);
        }
    }

    fn formula(&mut self, math: &Node) -> String {
        match math_fragment(math).and_then(|xml| self.formulas.convert(&xml)) {
            Ok(text) => text,
            Err(err) => {
                self.report.structural(
                    "formula.conversion-failed",
                    format!("{}: {err}", math.customer_id),
                );
                math.plain_text()
            }
        }
    }
}

fn html_name(tag: &Tag) -> &str {
    match tag {
        Tag::Table => "table",
        Tag::Bold => "b",
        Tag::Italic => "i",
        Tag::Underline => "u",
        Tag::Sup => "sup",
        Tag::Sub => "sub",
        Tag::Monospace => "code",
        Tag::P => "p",
        Tag::List => "ul",
        Tag::ListItem => "li",
        Tag::Title => "strong",
        Tag::Other(name) if PASSTHROUGH_ELEMENTS.contains(&name.as_str()) => name,
        _ => "span",
    }
}

fn is_private_use(c: char) -> bool {
    ('\u{E000}'..='\u{F8FF}').contains(&c)
}

/// Append text, wrapping private-use characters in marker spans.
fn append_text(parent: &Handle, text: &str) {
    let mut run = String::new();
    for c in text.chars() {
        if !is_private_use(c) {
            run.push(c);
            continue;
        }
        if !run.is_empty() {
            append(parent, create_text(&std::mem::take(&mut run)));
        }
        let codepoint = format!("U+{:04X}", c as u32);
        let span = create_element(
            "span",
            vec![("class", "private-use"), ("data-codepoint", codepoint.as_str())],
        );
        append(&span, create_text(&c.to_string()));
        append(parent, span);
    }
    if !run.is_empty() {
        append(parent, create_text(&run));
    }
}

fn append(parent: &Handle, child: Handle) {
    parent.children.borrow_mut().push(child);
}

fn create_element(tag: &str, attrs: Vec<(&str, &str)>) -> Handle {
    let qual_name = QualName::new(None, ns!(html), LocalName::from(tag));
    let attributes = attrs
        .into_iter()
        .map(|(name, value)| Attribute {
            name: QualName::new(None, ns!(), LocalName::from(name)),
            value: value.to_string().into(),
        })
        .collect();

    Rc::new(DomNode {
        parent: Cell::new(None),
        children: RefCell::new(Vec::new()),
        data: NodeData::Element {
            name: qual_name,
            attrs: RefCell::new(attributes),
            template_contents: Default::default(),
            mathml_annotation_xml_integration_point: false,
        },
    })
}

fn create_text(text: &str) -> Handle {
    Rc::new(DomNode {
        parent: Cell::new(None),
        children: RefCell::new(Vec::new()),
        data: NodeData::Text {
            contents: RefCell::new(text.to_string().into()),
        },
    })
}

fn serialize_fragment(root: &Handle) -> Result<String> {
    let mut output = Vec::new();
    let opts = SerializeOpts {
        traversal_scope: TraversalScope::IncludeNode,
        ..Default::default()
    };
    let serializable = SerializableHandle::from(root.clone());
    serialize(&mut output, &serializable, opts)
        .map_err(|e| ConvertError::Render(format!("table serialization failed: {e}")))?;
    String::from_utf8(output)
        .map_err(|e| ConvertError::Render(format!("table serialization produced invalid UTF-8: {e}")))
}
