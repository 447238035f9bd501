//! Hierarchical addressing engine
//!
//! Maps a node's structural path and tag to a stable, readable address and
//! owns the counters that make that mapping deterministic.
//!
//! # State
//!
//!     The engine keeps an append-only log of entries, one per structural-path
//!     occurrence (every level-defining element adds one). An entry records its
//!     path, its depth, up to [`MAX_LEVELS`] level counters and a per-type
//!     counter map for the countable elements that live directly in its scope.
//!
//! # Depth
//!
//!     Depth counts the path segments below the document-part marker. The
//!     marker itself (`front`, `body`, `back`) sits at depth 0 and carries no
//!     level counters, so every part restarts its numbering:
//!
//!     ```text
//!     front                 -> front
//!     front/title-wrap      -> title-wrap_1          (counter in front's scope)
//!     body/sec              -> sec_1
//!     body/sec/sec          -> sec_1-1
//!     body/sec/table-wrap   -> table-wrap_1_1, table-wrap_1_2, ...
//!     body/sec              -> sec_2
//!     ```
//!
//! # Address format
//!
//!     `tag`, then `_` and the level counters joined by `-` (trailing zero
//!     levels omitted) when any level is set, then `_N` when the element also
//!     carries a per-type counter.

use crate::tree::Tag;
use std::collections::HashMap;
use std::fmt;

/// Maximum number of level counters tracked per entry.
pub const MAX_LEVELS: usize = 10;

/// Ancestor tags restricted to the level-defining subset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StructuralPath(Vec<Tag>);

impl StructuralPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a path from level-defining tags; other tags are dropped.
    pub fn from_tags<'a, I>(tags: I) -> Self
    where
        I: IntoIterator<Item = &'a Tag>,
    {
        StructuralPath(
            tags.into_iter()
                .filter(|tag| tag.is_level_defining())
                .cloned()
                .collect(),
        )
    }

    /// Parse a `/`-separated path such as `body/sec/sec`.
    pub fn parse(path: &str) -> Self {
        Self::from_tags(
            path.split('/')
                .filter(|segment| !segment.is_empty())
                .map(Tag::from_name)
                .collect::<Vec<_>>()
                .iter(),
        )
    }

    pub fn push(&mut self, tag: Tag) {
        self.0.push(tag);
    }

    pub fn pop(&mut self) -> Option<Tag> {
        self.0.pop()
    }

    pub fn segments(&self) -> &[Tag] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of segments below the document-part marker.
    pub fn depth(&self) -> usize {
        match self.0.first() {
            Some(first) if first.is_document_part() => self.0.len() - 1,
            _ => self.0.len(),
        }
    }
}

impl fmt::Display for StructuralPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for tag in &self.0 {
            if !first {
                f.write_str("/")?;
            }
            f.write_str(tag.as_str())?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Entry {
    path: StructuralPath,
    depth: usize,
    levels: [u32; MAX_LEVELS],
    counters: HashMap<Tag, u32>,
}

/// Stateful counter and level tracker. One instance per document.
#[derive(Debug, Default)]
pub struct AddressingEngine {
    entries: Vec<Entry>,
}

impl AddressingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address a level-defining element. `path` includes the element itself.
    pub fn enter_level(&mut self, path: &StructuralPath, tag: &Tag) -> String {
        let mut depth = path.depth();
        if depth > MAX_LEVELS {
            tracing::warn!(%path, depth, "structural depth exceeds level capacity, clamping");
            depth = MAX_LEVELS;
        }

        let levels = self.levels_for(depth);
        let entry = Entry {
            path: path.clone(),
            depth,
            levels,
            counters: HashMap::new(),
        };
        let address = format_address(tag, &entry.levels, 0);
        tracing::debug!(%path, %address, "entered level");
        self.entries.push(entry);
        address
    }

    /// Address a countable element. `path` is the structural path of the
    /// element's scope (its level-defining ancestors).
    ///
    /// Returns an empty address when no entry matches the path: the element
    /// is unattached and callers must tolerate the empty anchor.
    pub fn enter_counter(&mut self, path: &StructuralPath, tag: &Tag) -> String {
        let Some(entry) = self.entries.iter_mut().rev().find(|e| &e.path == path) else {
            tracing::debug!(%path, %tag, "no scope for counter element");
            return String::new();
        };
        let counter = entry.counters.entry(tag.clone()).or_insert(0);
        *counter += 1;
        format_address(tag, &entry.levels, *counter)
    }

    /// Address any element: level-defining tags open a level, countable tags
    /// bump a counter, everything else is not addressed.
    pub fn address(&mut self, path: &StructuralPath, tag: &Tag) -> String {
        if tag.is_level_defining() {
            self.enter_level(path, tag)
        } else if tag.is_countable() {
            self.enter_counter(path, tag)
        } else {
            String::new()
        }
    }

    /// Current value of a per-type counter in the most recent scope matching
    /// `path`.
    pub fn counter(&self, path: &StructuralPath, tag: &Tag) -> u32 {
        self.entries
            .iter()
            .rev()
            .find(|e| &e.path == path)
            .and_then(|e| e.counters.get(tag).copied())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Level counters for a new entry at `depth`.
    fn levels_for(&self, depth: usize) -> [u32; MAX_LEVELS] {
        let mut levels = [0u32; MAX_LEVELS];
        if depth == 0 {
            return levels;
        }

        let Some(previous) = self.entries.last() else {
            levels[..depth].iter_mut().for_each(|level| *level = 1);
            return levels;
        };

        if previous.depth == depth {
            // Sibling of the previous entry.
            levels[..depth].copy_from_slice(&previous.levels[..depth]);
            levels[depth - 1] += 1;
            return levels;
        }

        if previous.depth < depth {
            // First child scope: new intervening levels start at 1.
            levels[..previous.depth].copy_from_slice(&previous.levels[..previous.depth]);
            levels[previous.depth..depth]
                .iter_mut()
                .for_each(|level| *level = 1);
            return levels;
        }

        // Previous entry is deeper: walk back up until a sibling or a parent
        // at a shallower depth is found.
        match self.entries.iter().rev().find(|e| e.depth <= depth) {
            Some(sibling) if sibling.depth == depth => {
                levels[..depth].copy_from_slice(&sibling.levels[..depth]);
                levels[depth - 1] += 1;
            }
            Some(parent) => {
                levels[..parent.depth].copy_from_slice(&parent.levels[..parent.depth]);
                levels[parent.depth..depth]
                    .iter_mut()
                    .for_each(|level| *level = 1);
            }
            None => {
                levels[..depth].iter_mut().for_each(|level| *level = 1);
            }
        }
        levels
    }
}

/// Render an address from a tag, its level counters and a per-type counter.
pub fn format_address(tag: &Tag, levels: &[u32], counter: u32) -> String {
    let mut address = tag.as_str().to_string();
    let significant = levels
        .iter()
        .rposition(|level| *level != 0)
        .map(|last| &levels[..=last])
        .unwrap_or(&[]);
    if !significant.is_empty() {
        address.push('_');
        let joined = significant
            .iter()
            .map(|level| level.to_string())
            .collect::<Vec<_>>()
            .join("-");
        address.push_str(&joined);
    }
    if counter > 0 {
        address.push('_');
        address.push_str(&counter.to_string());
    }
    address
}
