//! Link resolution against the cross-reference store and the registry.

use super::escape;
use crate::error::StoreError;
use crate::registry::DocumentRegistry;
use crate::xref::{href, XrefLookup};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    Internal {
        anchor: String,
    },
    External {
        document: String,
        anchor: Option<String>,
    },
    Unresolved {
        key: &'static str,
        reference: String,
    },
}

pub struct LinkResolver<'a> {
    xrefs: &'a dyn XrefLookup,
    registry: &'a DocumentRegistry,
    document_id: &'a str,
}

impl<'a> LinkResolver<'a> {
    pub fn new(
        xrefs: &'a dyn XrefLookup,
        registry: &'a DocumentRegistry,
        document_id: &'a str,
    ) -> Self {
        LinkResolver {
            xrefs,
            registry,
            document_id,
        }
    }

    /// Resolve an in-document reference (`xref/@rid`). Bibliography
    /// references point at the reference list, not the single entry.
    pub fn internal(&self, rid: &str, ref_type: Option<&str>) -> Result<LinkTarget, StoreError> {
        let rid = rid.split_whitespace().next().unwrap_or_default();
        match self.xrefs.lookup(rid)? {
            Some(entry) if entry.remark == self.document_id => {
                let anchor = if ref_type == Some("bibr") && !entry.parent_anchor_id.is_empty() {
                    entry.parent_anchor_id
                } else {
                    entry.anchor_id
                };
                Ok(LinkTarget::Internal { anchor })
            }
            Some(entry) => Ok(LinkTarget::Unresolved {
                key: "link.foreign-target",
                reference: format!("{rid} (registered by {})", entry.remark),
            }),
            None => Ok(LinkTarget::Unresolved {
                key: "link.unresolved",
                reference: rid.to_string(),
            }),
        }
    }

    /// Resolve an href that may encode a cross-document target.
    pub fn href(&self, target: &str) -> Result<LinkTarget, StoreError> {
        let Some(decoded) = href::decode(target) else {
            return Ok(self.document(target));
        };

        match self.xrefs.lookup(decoded.element_id)? {
            Some(entry) if entry.remark == self.document_id => Ok(LinkTarget::Internal {
                anchor: entry.anchor_id,
            }),
            Some(entry) => Ok(match self.registry.resolve(&entry.remark) {
                Some(document) => LinkTarget::External {
                    document: document.target_id.clone(),
                    anchor: Some(entry.anchor_id),
                },
                None => LinkTarget::Unresolved {
                    key: "document.unknown",
                    reference: entry.remark,
                },
            }),
            None => {
                let known = decoded
                    .document
                    .as_deref()
                    .and_then(|doc| self.registry.resolve(doc))
                    .is_some();
                Ok(LinkTarget::Unresolved {
                    key: if known {
                        "link.unresolved-anchor"
                    } else {
                        "document.unknown"
                    },
                    reference: target.to_string(),
                })
            }
        }
    }

    /// Resolve a reference to a whole document.
    pub fn document(&self, reference: &str) -> LinkTarget {
        match self.registry.resolve(reference) {
            Some(document) => LinkTarget::External {
                document: document.target_id.clone(),
                anchor: None,
            },
            None => LinkTarget::Unresolved {
                key: "document.unknown",
                reference: reference.to_string(),
            },
        }
    }
}

/// Render a resolved link around already-rendered label markup.
pub fn render(target: &LinkTarget, label: &str, warning_marker: &str) -> String {
    render_with_attrs(target, label, warning_marker, &[])
}

/// Like [`render`], with extra attributes on the link directive.
pub fn render_with_attrs(
    target: &LinkTarget,
    label: &str,
    warning_marker: &str,
    extra: &[(&str, &str)],
) -> String {
    let extra: String = extra
        .iter()
        .map(|(key, value)| format!(" {key}=\"{}\"", escape::attr(value)))
        .collect();
    match target {
        LinkTarget::Internal { anchor } => {
            format!("[link target=\"{}\"{extra}]{label}[/link]", escape::attr(anchor))
        }
        LinkTarget::External {
            document,
            anchor: Some(anchor),
        } => format!(
            "[link doc=\"{}\" target=\"{}\"{extra}]{label}[/link]",
            escape::attr(document),
            escape::attr(anchor)
        ),
        LinkTarget::External {
            document,
            anchor: None,
        } => format!("[link doc=\"{}\"{extra}]{label}[/link]", escape::attr(document)),
        LinkTarget::Unresolved { key, .. } => {
            format!("[warn key=\"{key}\"]{warning_marker}{label}[/warn]")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DocumentEntry;
    use crate::xref::{MemoryXrefs, XrefEntry, XrefWriter};

    fn fixture() -> (MemoryXrefs, DocumentRegistry) {
        let mut xrefs = MemoryXrefs::new();
        xrefs.put("s1", XrefEntry::new("sec_1", "body", "A")).unwrap();
        xrefs.put("r1", XrefEntry::new("ref_1", "ref-list_1", "A")).unwrap();
        xrefs.put("b-sec", XrefEntry::new("sec_4", "body", "B")).unwrap();
        let mut registry = DocumentRegistry::new();
        registry.register(DocumentEntry::new("A", "T-A"));
        registry.register(DocumentEntry::new("B", "T-B"));
        (xrefs, registry)
    }

    #[test]
    fn internal_links_resolve_to_anchors() {
        let (xrefs, registry) = fixture();
        let resolver = LinkResolver::new(&xrefs, &registry, "A");
        assert_eq!(
            resolver.internal("s1", Some("sec")).unwrap(),
            LinkTarget::Internal {
                anchor: "sec_1".into()
            }
        );
        assert_eq!(
            resolver.internal("r1", Some("bibr")).unwrap(),
            LinkTarget::Internal {
                anchor: "ref-list_1".into()
            }
        );
        assert!(matches!(
            resolver.internal("nope", None).unwrap(),
            LinkTarget::Unresolved { key: "link.unresolved", .. }
        ));
    }

    #[test]
    fn encoded_hrefs_prefer_own_document() {
        let (xrefs, registry) = fixture();
        let resolver = LinkResolver::new(&xrefs, &registry, "A");
        assert_eq!(
            resolver.href("A.xml#xpointer(//*[@id='s1'])").unwrap(),
            LinkTarget::Internal {
                anchor: "sec_1".into()
            }
        );
        assert_eq!(
            resolver.href("B.xml#xpointer(//*[@id='b-sec'])").unwrap(),
            LinkTarget::External {
                document: "T-B".into(),
                anchor: Some("sec_4".into())
            }
        );
    }

    #[test]
    fn unknown_targets_degrade() {
        let (xrefs, registry) = fixture();
        let resolver = LinkResolver::new(&xrefs, &registry, "A");
        assert!(matches!(
            resolver.href("B.xml#xpointer(//*[@id='missing'])").unwrap(),
            LinkTarget::Unresolved { key: "link.unresolved-anchor", .. }
        ));
        assert!(matches!(
            resolver.href("Z.xml#xpointer(//*[@id='missing'])").unwrap(),
            LinkTarget::Unresolved { key: "document.unknown", .. }
        ));
        assert_eq!(
            resolver.document("B"),
            LinkTarget::External {
                document: "T-B".into(),
                anchor: None
            }
        );
    }

    #[test]
    fn renders_each_target_kind() {
        let internal = LinkTarget::Internal {
            anchor: "sec_1".into(),
        };
        assert_eq!(render(&internal, "1", "⚠"), "[link target=\"sec_1\"]1[/link]");
        let unresolved = LinkTarget::Unresolved {
            key: "link.unresolved",
            reference: "x".into(),
        };
        assert_eq!(
            render(&unresolved, "see", "⚠ "),
            "[warn key=\"link.unresolved\"]⚠ see[/warn]"
        );
        let external = LinkTarget::External {
            document: "T-B".into(),
            anchor: None,
        };
        assert_eq!(
            render_with_attrs(&external, "ISO 2", "", &[("edition", "dated")]),
            "[link doc=\"T-B\" edition=\"dated\"]ISO 2[/link]"
        );
    }
}
