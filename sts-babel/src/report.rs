//! Accumulated, non-fatal conversion diagnostics.
//!
//! Every condition that degrades the output without aborting the conversion is
//! recorded here and logged through `tracing`. The caller receives the report
//! next to the markup; reviewers read the rendered consistency report before
//! output is promoted.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

/// Diagnostic taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// A required child is missing or an element sits where it is not handled.
    Structural,
    /// A customer id or external document id has no mapping.
    UnresolvedReference,
    /// A customer id was registered again with a different anchor id.
    DuplicateIdentifier,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Category::Structural => "structural",
            Category::UnresolvedReference => "unresolved-reference",
            Category::DuplicateIdentifier => "duplicate-identifier",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub category: Category,
    /// Stable message key, e.g. `figure.missing-graphic`.
    pub key: &'static str,
    /// Free text pointing at the offending element (ids, hrefs).
    pub reference: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    diagnostics: Vec<Diagnostic>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Warning => tracing::warn!(
                category = %diagnostic.category,
                key = diagnostic.key,
                reference = %diagnostic.reference,
                "conversion warning"
            ),
            Severity::Info => tracing::info!(
                category = %diagnostic.category,
                key = diagnostic.key,
                reference = %diagnostic.reference,
                "conversion note"
            ),
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn structural(&mut self, key: &'static str, reference: impl Into<String>) {
        self.push(Diagnostic {
            severity: Severity::Warning,
            category: Category::Structural,
            key,
            reference: reference.into(),
        });
    }

    pub fn unresolved(&mut self, key: &'static str, reference: impl Into<String>) {
        self.push(Diagnostic {
            severity: Severity::Warning,
            category: Category::UnresolvedReference,
            key,
            reference: reference.into(),
        });
    }

    pub fn duplicate(&mut self, key: &'static str, reference: impl Into<String>) {
        self.push(Diagnostic {
            severity: Severity::Warning,
            category: Category::DuplicateIdentifier,
            key,
            reference: reference.into(),
        });
    }

    /// Append all diagnostics of another report, keeping their order.
    pub fn merge(&mut self, other: Report) {
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn count(&self, category: Category) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.category == category)
            .count()
    }

    /// Render the human-readable consistency report.
    pub fn render_consistency_report(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "consistency report: {} structural, {} unresolved, {} duplicate\n",
            self.count(Category::Structural),
            self.count(Category::UnresolvedReference),
            self.count(Category::DuplicateIdentifier),
        ));
        for d in &self.diagnostics {
            let severity = match d.severity {
                Severity::Info => "info",
                Severity::Warning => "warn",
            };
            out.push_str(&format!(
                "{severity}\t{}\t{}\t{}\n",
                d.category, d.key, d.reference
            ));
        }
        out
    }
}
