//! Document registry for document discovery and id resolution
//!
//! The registry lists every document the converter knows about: its language,
//! the id the target system publishes it under, the schema variant (which
//! decides how it is partitioned) and any aliases that cross-document hrefs
//! may use to name it. It backs both the convert precondition and the
//! id-to-document map used to resolve external links.

use crate::error::{ConvertError, Result};
use crate::xref::href;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Schema variant of a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentVariant {
    /// Partitioned by document part and by first-level `sub-part`.
    #[default]
    SubParts,
    /// No sub-documents: first-level sections of the body partition instead.
    Flat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub id: String,
    #[serde(default)]
    pub language: String,
    /// Id the publishing target knows the document by.
    pub target_id: String,
    #[serde(default)]
    pub variant: DocumentVariant,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl DocumentEntry {
    pub fn new(id: impl Into<String>, target_id: impl Into<String>) -> Self {
        DocumentEntry {
            id: id.into(),
            language: String::new(),
            target_id: target_id.into(),
            variant: DocumentVariant::default(),
            aliases: Vec::new(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_variant(mut self, variant: DocumentVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    documents: Vec<DocumentEntry>,
}

/// Registry of known documents, keyed by id with an alias index.
#[derive(Debug, Default, Clone)]
pub struct DocumentRegistry {
    documents: HashMap<String, DocumentEntry>,
    aliases: HashMap<String, String>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document. A document with the same id is replaced.
    pub fn register(&mut self, entry: DocumentEntry) {
        for alias in &entry.aliases {
            self.aliases.insert(alias.clone(), entry.id.clone());
        }
        self.documents.insert(entry.id.clone(), entry);
    }

    /// Get a document by id.
    pub fn get(&self, id: &str) -> Result<&DocumentEntry> {
        self.documents
            .get(id)
            .ok_or_else(|| ConvertError::UnknownDocument(id.to_string()))
    }

    /// All document ids (sorted).
    pub fn list_documents(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.documents.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Resolve a reference as found in source hrefs: a document id, an alias,
    /// or a file name of either.
    pub fn resolve(&self, reference: &str) -> Option<&DocumentEntry> {
        let lookup = |key: &str| {
            self.documents
                .get(key)
                .or_else(|| self.aliases.get(key).and_then(|id| self.documents.get(id)))
        };
        lookup(reference.trim()).or_else(|| href::document_key(reference).and_then(|key| lookup(&key)))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Parse the registry file format: `{"documents": [ ... ]}`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: RegistryFile = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for entry in file.documents {
            registry.register(entry);
        }
        Ok(registry)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let registry = Self::from_json_str(&json)?;
        tracing::debug!(path = %path.display(), documents = registry.len(), "loaded document registry");
        Ok(registry)
    }
}
