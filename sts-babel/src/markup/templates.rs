//! Bit templates and the mode flags that select them.

use std::fmt;

/// Flags inherited top-down through the tree walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modes {
    pub normative: bool,
    pub remark: bool,
    pub boxed: bool,
}

impl Modes {
    pub fn with_normative(self, normative: bool) -> Self {
        Modes { normative, ..self }
    }

    pub fn with_remark(self) -> Self {
        Modes {
            remark: true,
            ..self
        }
    }

    pub fn with_boxed(self) -> Self {
        Modes {
            boxed: true,
            ..self
        }
    }
}

/// Template family requested by a handler before modes are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Article,
    Note,
    Remark,
}

/// One of the twelve text templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub family: Family,
    pub normative: bool,
    pub boxed: bool,
}

impl Template {
    /// Article content inside a remark context becomes a remark; notes stay
    /// notes.
    pub fn select(family: Family, modes: Modes) -> Template {
        let family = match family {
            Family::Article if modes.remark => Family::Remark,
            other => other,
        };
        Template {
            family,
            normative: modes.normative,
            boxed: modes.boxed,
        }
    }

    pub fn bit_type(&self) -> &'static str {
        match (self.family, self.normative, self.boxed) {
            (Family::Article, true, false) => "article-normative",
            (Family::Article, true, true) => "article-normative-boxed",
            (Family::Article, false, false) => "article-informative",
            (Family::Article, false, true) => "article-informative-boxed",
            (Family::Note, true, false) => "note-normative",
            (Family::Note, true, true) => "note-normative-boxed",
            (Family::Note, false, false) => "note-informative",
            (Family::Note, false, true) => "note-informative-boxed",
            (Family::Remark, true, false) => "remark-normative",
            (Family::Remark, true, true) => "remark-normative-boxed",
            (Family::Remark, false, false) => "remark-informative",
            (Family::Remark, false, true) => "remark-informative-boxed",
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.bit_type())
    }
}
