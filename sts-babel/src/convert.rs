//! Conversion pipeline.
//!
//! Ties the pieces together for one document:
//!
//!     1. the document must be listed in the registry
//!     2. the builder streams the source into an intermediate tree (the
//!        requested dump file, or an anonymous temporary file) and registers
//!        every source id in the store
//!     3. the tree is replayed into the markup generator, so links to targets
//!        later in the same document resolve
//!     4. queued renders run one at a time
//!     5. the output is moved into place only after the queue succeeded
//!
//! Use [`Converter::rebuild_xrefs`] to refresh one document's store entries
//! without generating markup, and [`Converter::render_tree`] to generate
//! markup from a tree dumped earlier.

use crate::error::{ConvertError, Result};
use crate::markup::{GeneratorContext, GeneratorOutput, GeneratorSettings, MarkupGenerator};
use crate::paths::relative_resource_dir;
use crate::registry::{DocumentEntry, DocumentRegistry};
use crate::render::{
    run_queue, AssetPublisher, FormulaConverter, ImageRenderer, PublishedAsset, RenderRequest,
};
use crate::report::Report;
use crate::tree::{replay, BuilderOptions, Discard, PartitionWriter, TreeBuilder};
use crate::xref::{StoreBatch, XrefStore};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Specifies one conversion.
///
/// ```ignore
/// let spec = ConversionSpec::new("ISO-1000", "in/iso-1000.xml")
///     .with_output_path("out/iso-1000.txt")
///     .with_tree_dump("work/iso-1000.tree.json");
/// ```
///
/// Without an output path the markup is returned in memory.
#[derive(Debug, Clone)]
pub struct ConversionSpec {
    pub document_id: String,
    pub source: PathBuf,
    pub output: Option<PathBuf>,
    /// Keep the intermediate tree at this path instead of a temporary file.
    pub tree_dump: Option<PathBuf>,
    /// Directory source graphics are resolved from. Defaults to the source's
    /// directory.
    pub resource_dir: Option<PathBuf>,
}

impl ConversionSpec {
    pub fn new(document_id: impl Into<String>, source: impl AsRef<Path>) -> Self {
        ConversionSpec {
            document_id: document_id.into(),
            source: source.as_ref().to_path_buf(),
            output: None,
            tree_dump: None,
            resource_dir: None,
        }
    }

    pub fn with_output_path(mut self, path: impl AsRef<Path>) -> Self {
        self.output = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_tree_dump(mut self, path: impl AsRef<Path>) -> Self {
        self.tree_dump = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_resource_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.resource_dir = Some(path.as_ref().to_path_buf());
        self
    }

    fn effective_resource_dir(&self) -> PathBuf {
        self.resource_dir.clone().unwrap_or_else(|| {
            match self.source.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            }
        })
    }
}

/// Where the markup ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    InMemory(String),
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub artifact: Artifact,
    pub report: Report,
    /// Assets produced by the render queue.
    pub assets: Vec<PublishedAsset>,
    /// Requests left for the caller when no renderer is configured.
    pub pending: Vec<RenderRequest>,
    pub bits: usize,
}

/// Result of a scoped store rebuild.
#[derive(Debug, Clone)]
pub struct RebuildResult {
    /// Entries of the document removed before the rebuild.
    pub removed: usize,
    pub report: Report,
}

/// Borrowed collaborators for a run of conversions.
pub struct Converter<'a> {
    registry: &'a DocumentRegistry,
    store: &'a XrefStore,
    settings: &'a GeneratorSettings,
    formulas: &'a dyn FormulaConverter,
    renderer: Option<(&'a dyn ImageRenderer, &'a dyn AssetPublisher)>,
}

impl<'a> Converter<'a> {
    pub fn new(
        registry: &'a DocumentRegistry,
        store: &'a XrefStore,
        settings: &'a GeneratorSettings,
        formulas: &'a dyn FormulaConverter,
    ) -> Self {
        Converter {
            registry,
            store,
            settings,
            formulas,
            renderer: None,
        }
    }

    /// Run the render queue with these collaborators instead of returning
    /// the requests as pending.
    pub fn with_renderer(
        mut self,
        renderer: &'a dyn ImageRenderer,
        publisher: &'a dyn AssetPublisher,
    ) -> Self {
        self.renderer = Some((renderer, publisher));
        self
    }

    pub fn convert(&self, spec: &ConversionSpec) -> Result<ConversionResult> {
        let document = self.registry.get(&spec.document_id)?;
        let resource_dir = spec.effective_resource_dir();
        tracing::info!(document = %document.id, source = %spec.source.display(), "converting");

        let mut tree = open_tree_file(spec.tree_dump.as_deref())?;
        let mut report = self.build_into(document, spec, &resource_dir, &mut tree)?;
        tree.seek(SeekFrom::Start(0))?;

        let generated = self.generate(document, &mut tree, &resource_dir)?;
        report.merge(generated.report);
        let (assets, pending) = self.run_renders(generated.renders, &mut report)?;
        let artifact = finalize(spec.output.as_deref(), generated.out)?;

        tracing::info!(
            document = %document.id,
            bits = generated.bits,
            diagnostics = report.len(),
            assets = assets.len(),
            pending = pending.len(),
            "conversion finished"
        );
        Ok(ConversionResult {
            artifact,
            report,
            assets,
            pending,
            bits: generated.bits,
        })
    }

    /// Build the intermediate tree only, at the spec's tree dump path, and
    /// register the document's ids. No markup is generated.
    pub fn build_tree(&self, spec: &ConversionSpec) -> Result<Report> {
        let document = self.registry.get(&spec.document_id)?;
        let Some(dump) = spec.tree_dump.as_deref() else {
            return Err(ConvertError::MissingTreePath(document.id.clone()));
        };
        let resource_dir = spec.effective_resource_dir();
        let mut tree = open_tree_file(Some(dump))?;
        let report = self.build_into(document, spec, &resource_dir, &mut tree)?;
        tracing::info!(document = %document.id, tree = %dump.display(), "tree written");
        Ok(report)
    }

    /// Drop every store entry of `document_id`, then re-register the ids of
    /// `source`. Other documents' entries are untouched.
    pub fn rebuild_xrefs(&self, document_id: &str, source: &Path) -> Result<RebuildResult> {
        let document = self.registry.get(document_id)?;
        let removed = self.store.delete_all_where_external_id(&document.id)?;
        let options = BuilderOptions::new(&document.id).with_variant(document.variant);
        let mut batch = StoreBatch::new(self.store);
        let report = TreeBuilder::new(options, &mut batch)
            .build(BufReader::new(File::open(source)?), &mut Discard)?;
        tracing::info!(document = %document.id, removed, "cross-references rebuilt");
        Ok(RebuildResult { removed, report })
    }

    /// Generate markup from an intermediate tree written by an earlier
    /// conversion. Relative resource directories in the tree header are
    /// resolved against the tree file's directory.
    pub fn render_tree(
        &self,
        document_id: &str,
        tree: &Path,
        output: Option<&Path>,
    ) -> Result<ConversionResult> {
        let document = self.registry.get(document_id)?;
        let tree_dir = match tree.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let ctx = self.context(document);
        let mut generator = MarkupGenerator::new(ctx, Vec::new()).with_tree_dir(tree_dir);
        replay(BufReader::new(File::open(tree)?), &mut generator)?;
        let generated = generator.finish()?;

        let mut report = generated.report;
        let (assets, pending) = self.run_renders(generated.renders, &mut report)?;
        let artifact = finalize(output, generated.out)?;
        Ok(ConversionResult {
            artifact,
            report,
            assets,
            pending,
            bits: generated.bits,
        })
    }

    fn build_into(
        &self,
        document: &DocumentEntry,
        spec: &ConversionSpec,
        resource_dir: &Path,
        tree: &mut File,
    ) -> Result<Report> {
        let recorded_dir = relative_resource_dir(
            resource_dir,
            spec.tree_dump.as_deref().and_then(Path::parent),
        );
        let options = BuilderOptions::new(&document.id)
            .with_variant(document.variant)
            .with_resource_dir(recorded_dir);

        let source = BufReader::new(File::open(&spec.source)?);
        let mut writer = PartitionWriter::new(BufWriter::new(tree));
        let mut batch = StoreBatch::new(self.store);
        let report = TreeBuilder::new(options, &mut batch).build(source, &mut writer)?;
        writer.finish()?.flush()?;
        Ok(report)
    }

    fn context(&self, document: &'a DocumentEntry) -> GeneratorContext<'a> {
        GeneratorContext {
            document,
            registry: self.registry,
            xrefs: self.store,
            formulas: self.formulas,
            settings: self.settings,
        }
    }

    fn generate(
        &self,
        document: &'a DocumentEntry,
        tree: &mut File,
        resource_dir: &Path,
    ) -> Result<GeneratorOutput<Vec<u8>>> {
        let mut generator = MarkupGenerator::new(self.context(document), Vec::new())
            .with_resource_dir(resource_dir);
        replay(BufReader::new(tree), &mut generator)?;
        generator.finish()
    }

    /// Run queued renders, or hand them back when no renderer is set.
    fn run_renders(
        &self,
        renders: Vec<RenderRequest>,
        report: &mut Report,
    ) -> Result<(Vec<PublishedAsset>, Vec<RenderRequest>)> {
        match self.renderer {
            Some((renderer, publisher)) => {
                Ok((run_queue(&renders, renderer, publisher, report)?, Vec::new()))
            }
            None => Ok((Vec::new(), renders)),
        }
    }
}

fn open_tree_file(dump: Option<&Path>) -> Result<File> {
    match dump {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            Ok(OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?)
        }
        None => Ok(tempfile::tempfile()?),
    }
}

/// Return the markup, or move it into place at `output` in one rename.
fn finalize(output: Option<&Path>, bytes: Vec<u8>) -> Result<Artifact> {
    let Some(path) = output else {
        return Ok(Artifact::InMemory(String::from_utf8_lossy(&bytes).into_owned()));
    };
    write_atomically(path, &bytes)?;
    Ok(Artifact::File(path.to_path_buf()))
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;
    let mut staged = NamedTempFile::new_in(&dir)?;
    staged.write_all(bytes)?;
    staged.persist(path).map_err(|err| err.error)?;
    Ok(())
}
