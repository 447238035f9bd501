//! Conversion of standards XML documents into target markup
//!
//!     This crate turns one standards XML document (front matter, body, back
//!     matter, optional sub-parts) into line-oriented target markup made of
//!     independently addressable bits, and keeps a cross-reference store that
//!     maps source ids to the stable addresses it generated, across documents.
//!
//!     It is a pure lib: it powers the `stsconv` binary but never reads env
//!     vars (apart from locating a browser for table rendering), prints or
//!     exits.
//!
//! Architecture
//!
//!     The pipeline is two passes over a partitioned intermediate tree:
//!
//!     source XML ──▶ TreeBuilder ──▶ partitions (JSON) ──▶ MarkupGenerator ──▶ markup
//!                        │                                       │
//!                        └──▶ XrefStore ◀── lookups ─────────────┘
//!
//!     The builder streams the source with quick-xml and hands partitions to a
//!     [`PartitionSink`](tree::PartitionSink) as soon as they close, so the
//!     whole document is never held in memory at once. The generator is itself
//!     a sink; [`convert`] writes the partitions to a tree file first and
//!     replays them, so every id of the document is registered before the
//!     first link is resolved.
//!
//!     The file structure:
//!     .
//!     ├── addressing.rs           # structural paths, counters, anchor ids
//!     ├── tree                    # tag vocabulary, nodes, builder, partition codec
//!     ├── xref                    # store file, advisory lock, href decoding
//!     ├── markup                  # generator, templates, links, tables, masking
//!     ├── render                  # renderer/formula/publisher collaborators and the render queue
//!     ├── registry.rs             # documents known to the converter
//!     ├── report.rs               # non-fatal diagnostics
//!     ├── convert.rs              # the pipeline
//!     └── error.rs
//!
//! Testing
//!
//!     tests
//!     ├── lib.rs
//!     ├── addressing
//!     ├── builder
//!     ├── generator
//!     ├── store
//!     └── fixtures
//!
//!     Rust does not discover tests in subdirectories by default, so
//!     tests/lib.rs mounts them.
//!
//! Addresses
//!
//!     Anchor ids are derived from the structural path only (see
//!     [`addressing`]): `sec_1`, `sec_1-2`, `table-wrap_1_2`. Converting the
//!     same input twice yields the same addresses, which is what makes the
//!     store usable across documents and runs.
//!
//! Failures
//!
//!     Malformed XML, store I/O and lock timeouts abort with a
//!     [`ConvertError`]. Everything else (missing children, unresolved links,
//!     duplicate ids, failed formulas) degrades the output and lands in the
//!     [`Report`] returned next to it.

pub mod addressing;
pub mod convert;
pub mod error;
pub mod markup;
pub mod registry;
pub mod render;
pub mod report;
pub mod tree;
pub mod xref;

mod paths;

pub use convert::{Artifact, ConversionResult, ConversionSpec, Converter, RebuildResult};
pub use error::{ConvertError, FormulaError, StoreError};
pub use markup::{GeneratorSettings, MarkupGenerator};
pub use registry::{DocumentEntry, DocumentRegistry, DocumentVariant};
pub use report::{Category, Diagnostic, Report, Severity};
pub use xref::{LockSettings, XrefEntry, XrefStore};
