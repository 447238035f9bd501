//! Cross-reference store
//!
//! Maps customer ids (the source `id` attributes) to the anchor ids the
//! builder assigned, so links can be resolved within a conversion and across
//! independently-run conversions.
//!
//! The builder writes through [`XrefWriter`], the generator reads through
//! [`XrefLookup`]. Both are implemented by the persistent [`XrefStore`] and by
//! the in-memory [`MemoryXrefs`].

pub mod href;
pub mod lock;
pub mod store;

pub use lock::{AdvisoryLock, LockSettings};
pub use store::{StoreBatch, XrefStore};

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One store record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XrefEntry {
    pub anchor_id: String,
    #[serde(default)]
    pub parent_anchor_id: String,
    /// External id of the document that registered the entry.
    #[serde(default)]
    pub remark: String,
}

impl XrefEntry {
    pub fn new(
        anchor_id: impl Into<String>,
        parent_anchor_id: impl Into<String>,
        remark: impl Into<String>,
    ) -> Self {
        XrefEntry {
            anchor_id: anchor_id.into(),
            parent_anchor_id: parent_anchor_id.into(),
            remark: remark.into(),
        }
    }
}

/// Result of an upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOutcome {
    /// The stored record changed.
    pub updated: bool,
    /// Anchor id that was kept when the key was already registered with a
    /// different anchor or by another document. The new record is dropped.
    pub conflict: Option<String>,
}

/// Apply one upsert to a map. The first record registered for a key wins;
/// only the document that registered it may move its parent anchor.
pub fn upsert(
    entries: &mut BTreeMap<String, XrefEntry>,
    customer_id: &str,
    entry: XrefEntry,
) -> PutOutcome {
    match entries.get_mut(customer_id) {
        None => {
            entries.insert(customer_id.to_string(), entry);
            PutOutcome {
                updated: true,
                conflict: None,
            }
        }
        Some(existing)
            if existing.anchor_id != entry.anchor_id || existing.remark != entry.remark =>
        {
            tracing::warn!(
                customer_id,
                kept = %existing.anchor_id,
                owner = %existing.remark,
                dropped = %entry.anchor_id,
                writer = %entry.remark,
                "customer id already registered"
            );
            PutOutcome {
                updated: false,
                conflict: Some(existing.anchor_id.clone()),
            }
        }
        Some(existing) if existing.parent_anchor_id != entry.parent_anchor_id => {
            existing.parent_anchor_id = entry.parent_anchor_id;
            PutOutcome {
                updated: true,
                conflict: None,
            }
        }
        Some(_) => PutOutcome::default(),
    }
}

/// Write side used by the tree builder.
///
/// Outcomes may be deferred: a writer can buffer puts and apply them on
/// [`flush`](XrefWriter::flush), which returns every outcome produced since
/// the previous flush.
pub trait XrefWriter {
    fn put(&mut self, customer_id: &str, entry: XrefEntry) -> Result<(), StoreError>;

    fn flush(&mut self) -> Result<Vec<(String, PutOutcome)>, StoreError>;
}

/// Read side used by the markup generator.
pub trait XrefLookup {
    /// Look up a customer id. Encoded hrefs are decoded first.
    fn lookup(&self, key: &str) -> Result<Option<XrefEntry>, StoreError>;
}

/// Map-backed store for single-process runs and tests.
#[derive(Debug, Default)]
pub struct MemoryXrefs {
    entries: BTreeMap<String, XrefEntry>,
    outcomes: Vec<(String, PutOutcome)>,
}

impl MemoryXrefs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &BTreeMap<String, XrefEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl XrefWriter for MemoryXrefs {
    fn put(&mut self, customer_id: &str, entry: XrefEntry) -> Result<(), StoreError> {
        let outcome = upsert(&mut self.entries, customer_id, entry);
        self.outcomes.push((customer_id.to_string(), outcome));
        Ok(())
    }

    fn flush(&mut self) -> Result<Vec<(String, PutOutcome)>, StoreError> {
        Ok(std::mem::take(&mut self.outcomes))
    }
}

impl XrefLookup for MemoryXrefs {
    fn lookup(&self, key: &str) -> Result<Option<XrefEntry>, StoreError> {
        let key = href::element_id(key).unwrap_or(key);
        Ok(self.entries.get(key).cloned())
    }
}
