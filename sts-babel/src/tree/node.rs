//! Addressed document nodes.

use super::Tag;
use crate::addressing::StructuralPath;
use serde::{Deserialize, Serialize};

/// Opaque node identity, unique within one conversion.
pub type NodeId = u64;

/// Top-level document region a node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentPart {
    Front,
    Body,
    Back,
}

impl DocumentPart {
    pub fn from_tag(tag: &Tag) -> Option<Self> {
        match tag {
            Tag::Front => Some(DocumentPart::Front),
            Tag::Body => Some(DocumentPart::Body),
            Tag::Back => Some(DocumentPart::Back),
            _ => None,
        }
    }
}

/// One element of the document tree. A node exclusively owns its children;
/// the link to its parent is the parent's anchor id, a lookup key only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub tag: Tag,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub customer_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub anchor_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent_anchor_id: String,
    /// Level-defining ancestors (and self, for level-defining nodes).
    #[serde(skip)]
    pub structural_path: StructuralPath,
    #[serde(default)]
    pub section_level: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<DocumentPart>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub_part_id: String,
    /// Index of the first child not yet processed by the generator.
    #[serde(skip)]
    pub cursor: usize,
}

impl Node {
    pub fn new(id: NodeId, tag: Tag) -> Self {
        Node {
            id,
            tag,
            attributes: Vec::new(),
            text: String::new(),
            children: Vec::new(),
            customer_id: String::new(),
            anchor_id: String::new(),
            parent_anchor_id: String::new(),
            structural_path: StructuralPath::new(),
            section_level: 0,
            part: None,
            sub_part_id: String::new(),
            cursor: 0,
        }
    }

    /// Text fragment node.
    pub fn text_fragment(id: NodeId, text: impl Into<String>) -> Self {
        let mut node = Node::new(id, Tag::Text);
        node.text = text.into();
        node
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_text(&self) -> bool {
        self.tag == Tag::Text
    }

    pub fn child(&self, tag: &Tag) -> Option<&Node> {
        self.children.iter().find(|child| &child.tag == tag)
    }

    /// Depth-first search, including `self`.
    pub fn find<P>(&self, predicate: &P) -> Option<&Node>
    where
        P: Fn(&Node) -> bool,
    {
        if predicate(self) {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(predicate))
    }

    pub fn find_by_customer_id(&self, customer_id: &str) -> Option<&Node> {
        self.find(&|node: &Node| node.customer_id == customer_id)
    }

    /// Whether any descendant (not `self`) is a complex block.
    pub fn contains_complex(&self) -> bool {
        self.children
            .iter()
            .any(|child| child.tag.is_complex_block() || child.contains_complex())
    }

    /// Concatenated text of all fragments below this node.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if self.is_text() {
            out.push_str(&self.text);
            return;
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }

    /// Number of nodes in this subtree.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(Node::size).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph_with_figure() -> Node {
        Node::new(1, Tag::P)
            .with_child(Node::text_fragment(2, "before "))
            .with_child(
                Node::new(3, Tag::Fig)
                    .with_attribute("id", "f1")
                    .with_child(Node::new(4, Tag::Graphic)),
            )
            .with_child(Node::text_fragment(5, " after"))
    }

    #[test]
    fn detects_complex_descendants() {
        let para = paragraph_with_figure();
        assert!(para.contains_complex());
        let plain = Node::new(1, Tag::P).with_child(Node::text_fragment(2, "x"));
        assert!(!plain.contains_complex());
    }

    #[test]
    fn plain_text_concatenates_fragments() {
        assert_eq!(paragraph_with_figure().plain_text(), "before  after");
    }

    #[test]
    fn attribute_lookup_and_search() {
        let mut para = paragraph_with_figure();
        para.children[1].customer_id = "f1".to_string();
        assert_eq!(para.children[1].attr("id"), Some("f1"));
        assert_eq!(para.find_by_customer_id("f1").map(|n| n.id), Some(3));
        assert_eq!(para.size(), 5);
    }

    #[test]
    fn cursor_is_not_serialized() {
        let mut node = Node::new(7, Tag::P);
        node.cursor = 3;
        let json = serde_json::to_string(&node).unwrap();
        assert!(!json.contains("cursor"));
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cursor, 0);
    }
}
