//! The fixed element vocabulary.
//!
//! Tags are a closed enum so the generator can dispatch with an exhaustive
//! `match`. Names outside the vocabulary survive as [`Tag::Other`] and fall
//! through to the generic descend handler.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Tag {
    // Document root and parts
    Standard,
    Front,
    Body,
    Back,
    SubPart,

    // Section containers
    Sec,
    SecParagraph,
    App,
    AppGroup,
    TermSec,

    // Countable blocks
    TitleWrap,
    TableWrap,
    Fig,
    FigGroup,
    DispFormula,
    RefList,
    Legend,
    List,
    Ref,
    DefList,
    NonNormativeNote,
    NonNormativeExample,
    RevisionNote,
    FnGroup,

    // Content
    Title,
    Label,
    Caption,
    P,
    ListItem,
    DefItem,
    Term,
    Def,
    BoxedText,
    Table,
    TableWrapFoot,
    Graphic,
    InlineGraphic,
    InlineFormula,
    Math,
    MixedCitation,
    Fn,
    Xref,
    ExtLink,
    Std,
    StdDated,
    StdSuperseding,
    StdRef,
    Bold,
    Italic,
    Underline,
    Sup,
    Sub,
    Monospace,

    /// Text fragment materialised by the builder.
    Text,

    /// Anything outside the vocabulary, name preserved.
    Other(String),
}

impl Tag {
    pub fn from_name(name: &str) -> Tag {
        match name {
            "standard" => Tag::Standard,
            "front" => Tag::Front,
            "body" => Tag::Body,
            "back" => Tag::Back,
            "sub-part" => Tag::SubPart,
            "sec" => Tag::Sec,
            "sec-paragraph" => Tag::SecParagraph,
            "app" => Tag::App,
            "app-group" => Tag::AppGroup,
            "term-sec" => Tag::TermSec,
            "title-wrap" => Tag::TitleWrap,
            "table-wrap" => Tag::TableWrap,
            "fig" => Tag::Fig,
            "fig-group" => Tag::FigGroup,
            "disp-formula" => Tag::DispFormula,
            "ref-list" => Tag::RefList,
            "legend" => Tag::Legend,
            "list" => Tag::List,
            "ref" => Tag::Ref,
            "def-list" => Tag::DefList,
            "non-normative-note" => Tag::NonNormativeNote,
            "non-normative-example" => Tag::NonNormativeExample,
            "revision-note" => Tag::RevisionNote,
            "fn-group" => Tag::FnGroup,
            "title" => Tag::Title,
            "label" => Tag::Label,
            "caption" => Tag::Caption,
            "p" => Tag::P,
            "list-item" => Tag::ListItem,
            "def-item" => Tag::DefItem,
            "term" => Tag::Term,
            "def" => Tag::Def,
            "boxed-text" => Tag::BoxedText,
            "table" => Tag::Table,
            "table-wrap-foot" => Tag::TableWrapFoot,
            "graphic" => Tag::Graphic,
            "inline-graphic" => Tag::InlineGraphic,
            "inline-formula" => Tag::InlineFormula,
            "mml:math" | "math" => Tag::Math,
            "mixed-citation" => Tag::MixedCitation,
            "fn" => Tag::Fn,
            "xref" => Tag::Xref,
            "ext-link" => Tag::ExtLink,
            "std" => Tag::Std,
            "std-dated" => Tag::StdDated,
            "std-superseding" => Tag::StdSuperseding,
            "std-ref" => Tag::StdRef,
            "bold" => Tag::Bold,
            "italic" => Tag::Italic,
            "underline" => Tag::Underline,
            "sup" => Tag::Sup,
            "sub" => Tag::Sub,
            "monospace" => Tag::Monospace,
            "#text" => Tag::Text,
            other => Tag::Other(other.to_string()),
        }
    }

    /// Map an element name plus its attributes to a tag, applying the
    /// synthetic remaps that let the generator dispatch on tag alone.
    pub fn from_element<'a, I>(name: &str, attributes: I) -> Tag
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let tag = Tag::from_name(name);
        let remap = |key: &str, value: &str| -> Option<Tag> {
            match (&tag, key, value) {
                (Tag::Sec, "sec-type", "paragraph") => Some(Tag::SecParagraph),
                (Tag::NonNormativeNote, "content-type", "revision-description") => {
                    Some(Tag::RevisionNote)
                }
                (Tag::Std, "type", "dated") => Some(Tag::StdDated),
                (Tag::Std, "type", "supersedes") => Some(Tag::StdSuperseding),
                _ => None,
            }
        };
        for (key, value) in attributes {
            if let Some(remapped) = remap(key, value) {
                return remapped;
            }
        }
        tag
    }

    pub fn as_str(&self) -> &str {
        match self {
            Tag::Standard => "standard",
            Tag::Front => "front",
            Tag::Body => "body",
            Tag::Back => "back",
            Tag::SubPart => "sub-part",
            Tag::Sec => "sec",
            Tag::SecParagraph => "sec-paragraph",
            Tag::App => "app",
            Tag::AppGroup => "app-group",
            Tag::TermSec => "term-sec",
            Tag::TitleWrap => "title-wrap",
            Tag::TableWrap => "table-wrap",
            Tag::Fig => "fig",
            Tag::FigGroup => "fig-group",
            Tag::DispFormula => "disp-formula",
            Tag::RefList => "ref-list",
            Tag::Legend => "legend",
            Tag::List => "list",
            Tag::Ref => "ref",
            Tag::DefList => "def-list",
            Tag::NonNormativeNote => "non-normative-note",
            Tag::NonNormativeExample => "non-normative-example",
            Tag::RevisionNote => "revision-note",
            Tag::FnGroup => "fn-group",
            Tag::Title => "title",
            Tag::Label => "label",
            Tag::Caption => "caption",
            Tag::P => "p",
            Tag::ListItem => "list-item",
            Tag::DefItem => "def-item",
            Tag::Term => "term",
            Tag::Def => "def",
            Tag::BoxedText => "boxed-text",
            Tag::Table => "table",
            Tag::TableWrapFoot => "table-wrap-foot",
            Tag::Graphic => "graphic",
            Tag::InlineGraphic => "inline-graphic",
            Tag::InlineFormula => "inline-formula",
            Tag::Math => "mml:math",
            Tag::MixedCitation => "mixed-citation",
            Tag::Fn => "fn",
            Tag::Xref => "xref",
            Tag::ExtLink => "ext-link",
            Tag::Std => "std",
            Tag::StdDated => "std-dated",
            Tag::StdSuperseding => "std-superseding",
            Tag::StdRef => "std-ref",
            Tag::Bold => "bold",
            Tag::Italic => "italic",
            Tag::Underline => "underline",
            Tag::Sup => "sup",
            Tag::Sub => "sub",
            Tag::Monospace => "monospace",
            Tag::Text => "#text",
            Tag::Other(name) => name,
        }
    }

    /// Top-level document regions.
    pub fn is_document_part(&self) -> bool {
        matches!(self, Tag::Front | Tag::Body | Tag::Back)
    }

    /// Tags that open a new level in the structural path.
    pub fn is_level_defining(&self) -> bool {
        matches!(
            self,
            Tag::Front
                | Tag::Body
                | Tag::Back
                | Tag::SubPart
                | Tag::Sec
                | Tag::SecParagraph
                | Tag::App
                | Tag::AppGroup
                | Tag::TermSec
        )
    }

    /// Tags numbered by a per-type counter within their structural scope.
    pub fn is_countable(&self) -> bool {
        matches!(
            self,
            Tag::TitleWrap
                | Tag::TableWrap
                | Tag::Fig
                | Tag::FigGroup
                | Tag::DispFormula
                | Tag::RefList
                | Tag::Legend
                | Tag::List
                | Tag::Ref
                | Tag::DefList
                | Tag::NonNormativeNote
                | Tag::NonNormativeExample
                | Tag::RevisionNote
                | Tag::FnGroup
        )
    }

    /// Elements whose text and inline children run together, so whitespace
    /// between two children is a word separator.
    pub fn holds_mixed_content(&self) -> bool {
        matches!(
            self,
            Tag::Title
                | Tag::Label
                | Tag::P
                | Tag::Term
                | Tag::MixedCitation
                | Tag::Xref
                | Tag::ExtLink
                | Tag::Std
                | Tag::StdDated
                | Tag::StdSuperseding
                | Tag::StdRef
                | Tag::Bold
                | Tag::Italic
                | Tag::Underline
                | Tag::Sup
                | Tag::Sub
                | Tag::Monospace
        )
    }

    /// Blocks that cannot live inside a contiguous text bit.
    pub fn is_complex_block(&self) -> bool {
        matches!(
            self,
            Tag::Fig | Tag::FigGroup | Tag::TableWrap | Tag::BoxedText | Tag::DispFormula
        )
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Tag {
    fn from(name: String) -> Self {
        Tag::from_name(&name)
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.as_str().to_string()
    }
}
