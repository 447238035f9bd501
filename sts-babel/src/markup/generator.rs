//! Markup generator
//!
//! Walks partitions depth-first and writes target markup. Dispatch is an
//! exhaustive `match` on [`Tag`]; anything outside the vocabulary descends
//! into its children.
//!
//! # Bits
//!
//!     Text content is written as bits, each independently addressed by the
//!     node's anchor id (or its customer id when it has none). A text node
//!     that contains a complex block (figure, table, formula, boxed text) is
//!     split around it: the text before becomes one bit, the complex block its
//!     own, and the text after a further bit with id `<id>-2`, `<id>-3`, ...
//!     The split resumes from [`Node::cursor`], so no child is emitted twice.
//!
//! # Modes
//!
//!     `normative`, `remark` and `boxed` are inherited top-down and select one
//!     of the twelve templates together with the family the handler asks for.

use super::links::{self, LinkResolver, LinkTarget};
use super::table;
use super::templates::{Family, Modes, Template};
use super::escape;
use crate::error::Result;
use crate::registry::{DocumentEntry, DocumentRegistry};
use crate::render::publisher::{asset_base, asset_url};
use crate::render::{math_fragment, FormulaConverter, RenderRequest};
use crate::report::Report;
use crate::tree::{DocumentPart, Node, NodeId, Partition, PartitionSink, Tag, TreeHeader};
use crate::xref::{href, XrefLookup};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub asset_base_url: Url,
    pub image_extension: String,
    /// Prefix written inside every `[warn]` placeholder.
    pub warning_marker: String,
}

impl GeneratorSettings {
    pub fn new(asset_base_url: &str) -> Result<Self> {
        Ok(GeneratorSettings {
            asset_base_url: asset_base(asset_base_url)?,
            image_extension: "png".to_string(),
            warning_marker: "\u{26A0} ".to_string(),
        })
    }

    pub fn with_image_extension(mut self, extension: impl Into<String>) -> Self {
        self.image_extension = extension.into();
        self
    }

    pub fn with_warning_marker(mut self, marker: impl Into<String>) -> Self {
        self.warning_marker = marker.into();
        self
    }
}

/// Everything the generator reads but does not own.
#[derive(Clone, Copy)]
pub struct GeneratorContext<'a> {
    pub document: &'a DocumentEntry,
    pub registry: &'a DocumentRegistry,
    pub xrefs: &'a dyn XrefLookup,
    pub formulas: &'a dyn FormulaConverter,
    pub settings: &'a GeneratorSettings,
}

#[derive(Debug)]
pub struct GeneratorOutput<W> {
    pub out: W,
    pub report: Report,
    /// Deferred table renders and graphic publications, in walk order.
    pub renders: Vec<RenderRequest>,
    pub bits: usize,
}

#[derive(Debug, Clone)]
struct Footnote {
    node: NodeId,
    label: String,
    text: String,
}

pub struct MarkupGenerator<'a, W: Write> {
    ctx: GeneratorContext<'a>,
    links: LinkResolver<'a>,
    out: W,
    report: Report,
    visited: HashSet<NodeId>,
    footnotes: HashMap<String, Footnote>,
    renders: Vec<RenderRequest>,
    resource_dir: PathBuf,
    /// Directory relative resource dirs in a tree header are resolved from.
    tree_dir: PathBuf,
    bits: usize,
}

impl<'a, W: Write> MarkupGenerator<'a, W> {
    pub fn new(ctx: GeneratorContext<'a>, out: W) -> Self {
        MarkupGenerator {
            links: LinkResolver::new(ctx.xrefs, ctx.registry, &ctx.document.id),
            ctx,
            out,
            report: Report::new(),
            visited: HashSet::new(),
            footnotes: HashMap::new(),
            renders: Vec::new(),
            resource_dir: PathBuf::new(),
            tree_dir: PathBuf::new(),
            bits: 0,
        }
    }

    pub fn with_resource_dir(mut self, resource_dir: impl Into<PathBuf>) -> Self {
        self.resource_dir = resource_dir.into();
        self
    }

    pub fn with_tree_dir(mut self, tree_dir: impl Into<PathBuf>) -> Self {
        self.tree_dir = tree_dir.into();
        self
    }

    pub fn finish(mut self) -> Result<GeneratorOutput<W>> {
        self.out.flush()?;
        tracing::info!(
            document = %self.ctx.document.id,
            bits = self.bits,
            renders = self.renders.len(),
            "markup generated"
        );
        Ok(GeneratorOutput {
            out: self.out,
            report: self.report,
            renders: self.renders,
            bits: self.bits,
        })
    }

    /// Generate one partition.
    pub fn partition(&mut self, mut partition: Partition) -> Result<()> {
        self.footnotes = collect_footnotes(&partition.root);
        let modes = Modes::default()
            .with_normative(partition.root.part == Some(DocumentPart::Body));
        if partition.continued {
            self.visited.insert(partition.root.id);
            self.children(&mut partition.root, modes)
        } else {
            self.visit(&mut partition.root, modes)
        }
    }

    fn visit(&mut self, node: &mut Node, modes: Modes) -> Result<()> {
        if !self.visited.insert(node.id) {
            return Ok(());
        }
        match node.tag {
            Tag::Standard => self.children(node, modes),
            Tag::Front | Tag::Body | Tag::Back => self.part(node, modes),
            Tag::SubPart => self.sub_part(node, modes),
            Tag::Sec | Tag::SecParagraph | Tag::App | Tag::AppGroup | Tag::TermSec => {
                self.section(node, modes)
            }
            Tag::TitleWrap => self.title_block(node),
            Tag::TableWrap | Tag::Table => self.table(node),
            Tag::Fig => self.figure(node, modes),
            Tag::FigGroup => self.figure_group(node, modes),
            Tag::DispFormula | Tag::Math | Tag::InlineFormula => self.formula_block(node),
            Tag::BoxedText => self.boxed(node, modes),
            Tag::RefList => self.ref_list(node, modes),
            Tag::List => {
                let open = format!("[list type=\"{}\"]", list_type(node));
                self.text_block(node, modes, Family::Article, Some((open.as_str(), "[/list]")))
            }
            Tag::DefList => {
                self.text_block(node, modes, Family::Article, Some(("[deflist]", "[/deflist]")))
            }
            Tag::NonNormativeNote | Tag::Fn => self.text_block(node, modes, Family::Note, None),
            Tag::NonNormativeExample | Tag::RevisionNote => {
                self.text_block(node, modes.with_remark(), Family::Remark, None)
            }
            Tag::FnGroup => self.children(node, modes),
            Tag::P
            | Tag::Legend
            | Tag::Ref
            | Tag::MixedCitation
            | Tag::ListItem
            | Tag::DefItem
            | Tag::Term
            | Tag::Def
            | Tag::TableWrapFoot => self.text_block(node, modes, Family::Article, None),
            Tag::Title | Tag::Label | Tag::Caption => {
                self.report.structural(
                    "element.unexpected-position",
                    format!("{} {}", node.tag, node.customer_id),
                );
                self.text_block(node, modes, Family::Article, None)
            }
            Tag::Graphic | Tag::InlineGraphic => self.standalone_graphic(node),
            Tag::Text => self.loose_text(node, modes),
            Tag::Xref
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
            | Tag::Monospace => self.loose_inline(node, modes),
            Tag::Other(_) => self.children(node, modes),
        }
    }

    fn children(&mut self, node: &mut Node, modes: Modes) -> Result<()> {
        for child in node.children.iter_mut() {
            self.visit(child, modes)?;
        }
        Ok(())
    }

    fn part(&mut self, node: &mut Node, modes: Modes) -> Result<()> {
        writeln!(
            self.out,
            "[part name=\"{}\" id=\"{}\"]",
            node.tag,
            escape::attr(&node.anchor_id)
        )?;
        let modes = modes.with_normative(node.tag == Tag::Body);
        self.children(node, modes)
    }

    fn sub_part(&mut self, node: &mut Node, modes: Modes) -> Result<()> {
        let title = node
            .find(&|n: &Node| matches!(n.tag, Tag::Title))
            .map(|title| squash(&title.plain_text()))
            .unwrap_or_default();
        writeln!(
            self.out,
            "[subdoc id=\"{}\" title=\"{}\"]",
            escape::attr(&bit_id(node)),
            escape::attr(&title)
        )?;
        self.children(node, modes)
    }

    fn section(&mut self, node: &mut Node, modes: Modes) -> Result<()> {
        let modes = match (node.tag == Tag::App, node.attr("content-type")) {
            (true, Some("norm-annex")) => modes.with_normative(true),
            (true, Some("inform-annex")) => modes.with_normative(false),
            _ => modes,
        };

        let mut heading = String::new();
        for child in &node.children {
            if matches!(child.tag, Tag::Label | Tag::Title) && !self.visited.contains(&child.id) {
                self.visited.insert(child.id);
                if !heading.is_empty() {
                    heading.push(' ');
                }
                let mut rendered = String::new();
                self.inline_children(child, modes, &mut rendered)?;
                heading.push_str(rendered.trim());
            }
        }

        if heading.is_empty() {
            if node.tag != Tag::SecParagraph {
                self.report.structural("section.missing-title", bit_id(node));
            }
        } else {
            let template = Template::select(Family::Article, modes);
            let body = format!("[title level=\"{}\"]{heading}[/title]", node.section_level);
            self.bit(template.bit_type(), &bit_id(node), &node.parent_anchor_id, &body)?;
        }
        self.children(node, modes)
    }

    fn title_block(&mut self, node: &mut Node) -> Result<()> {
        let mut body = String::new();
        for child in &node.children {
            if child.is_text() {
                continue;
            }
            let mut rendered = String::new();
            self.inline_children(child, Modes::default(), &mut rendered)?;
            let rendered = rendered.trim();
            if rendered.is_empty() {
                continue;
            }
            if !body.is_empty() {
                body.push('\n');
            }
            body.push_str(&format!(
                "[title level=\"0\" part=\"{}\"]{rendered}[/title]",
                escape::attr(child.tag.as_str())
            ));
        }
        if body.is_empty() {
            self.report.structural("title-block.empty", bit_id(node));
            return Ok(());
        }
        self.bit("title-block", &bit_id(node), &node.parent_anchor_id, &body)
    }

    /// Text content, split around complex children.
    fn text_block(
        &mut self,
        node: &mut Node,
        modes: Modes,
        family: Family,
        wrap: Option<(&str, &str)>,
    ) -> Result<()> {
        let template = Template::select(family, modes);
        let base = bit_id(node);
        let parent = node.parent_anchor_id.clone();
        let mut segment = 0;

        loop {
            let mut rendered = String::new();
            while node.cursor < node.children.len() {
                let child = &node.children[node.cursor];
                if child.tag.is_complex_block() || child.contains_complex() {
                    break;
                }
                self.inline(child, modes, &mut rendered)?;
                node.cursor += 1;
            }

            let content = rendered.trim();
            if !content.is_empty() {
                segment += 1;
                let body = match wrap {
                    Some((open, close)) => format!("{open}\n{content}\n{close}"),
                    None => content.to_string(),
                };
                self.bit(template.bit_type(), &segment_id(&base, segment), &parent, &body)?;
            }

            if node.cursor >= node.children.len() {
                return Ok(());
            }
            let index = node.cursor;
            node.cursor += 1;
            let child = &mut node.children[index];
            if child.tag.is_complex_block() {
                self.visit(child, modes)?;
            } else if self.visited.insert(child.id) {
                // A container of a complex block keeps this block's family.
                self.text_block(child, modes, family, None)?;
            }
        }
    }

    fn figure(&mut self, node: &mut Node, modes: Modes) -> Result<()> {
        let caption = caption_text(node);
        let mut body = String::new();

        let graphic = node
            .find(&|n: &Node| n.tag == Tag::Graphic)
            .map(|g| graphic_href(g).map(str::to_string));
        match graphic {
            Some(Some(href)) => {
                let url = self.queue_graphic(&href)?;
                body.push_str(&format!(
                    "[image src=\"{}\" caption=\"{}\"]",
                    escape::attr(&url),
                    escape::attr(&caption)
                ));
            }
            Some(None) => {
                self.report.structural("graphic.missing-href", bit_id(node));
                body.push_str(&self.placeholder("graphic.missing-href", &escape::text(&caption)));
            }
            None => {
                self.report.structural("figure.missing-graphic", bit_id(node));
                body.push_str(&self.placeholder("figure.missing-graphic", &escape::text(&caption)));
            }
        }

        for child in &node.children {
            match child.tag {
                Tag::Legend | Tag::NonNormativeNote | Tag::P => {
                    let mut rendered = String::new();
                    self.inline_children(child, modes, &mut rendered)?;
                    let rendered = rendered.trim();
                    if !rendered.is_empty() {
                        let name = if child.tag == Tag::Legend { "legend" } else { "note" };
                        body.push_str(&format!("\n[{name}]{rendered}[/{name}]"));
                    }
                }
                _ => {}
            }
        }
        self.bit("figure", &bit_id(node), &node.parent_anchor_id, &body)
    }

    fn figure_group(&mut self, node: &mut Node, modes: Modes) -> Result<()> {
        let caption = caption_text(node);
        let body = format!("[caption]{}[/caption]", escape::text(&caption));
        self.bit("figure-group", &bit_id(node), &node.parent_anchor_id, &body)?;
        let mut figures = 0;
        for child in node.children.iter_mut() {
            if child.tag == Tag::Fig {
                figures += 1;
                self.visit(child, modes)?;
            }
        }
        if figures == 0 {
            self.report.structural("figure-group.empty", bit_id(node));
        }
        Ok(())
    }

    fn table(&mut self, node: &mut Node) -> Result<()> {
        let has_table = node.tag == Tag::Table || node.child(&Tag::Table).is_some();
        if !has_table {
            self.report.structural("table.missing-table", bit_id(node));
            let body = self.placeholder("table.missing-table", &escape::text(&caption_text(node)));
            return self.bit("table", &bit_id(node), &node.parent_anchor_id, &body);
        }

        let html = table::flatten(node, self.ctx.formulas, &mut self.report)?;
        let filename = table::image_filename(
            &self.ctx.document.target_id,
            node,
            &self.ctx.settings.image_extension,
        );
        let url = asset_url(&self.ctx.settings.asset_base_url, &filename)?;
        self.renders.push(RenderRequest::Table {
            html,
            filename,
            url: url.clone(),
        });
        let body = format!(
            "[image src=\"{}\" kind=\"table\" caption=\"{}\"]",
            escape::attr(&url),
            escape::attr(&caption_text(node))
        );
        self.bit("table", &bit_id(node), &node.parent_anchor_id, &body)
    }

    fn formula_block(&mut self, node: &mut Node) -> Result<()> {
        let label = node
            .child(&Tag::Label)
            .map(|label| squash(&label.plain_text()))
            .unwrap_or_default();
        let mut body = String::new();
        if label.is_empty() {
            body.push_str("[formula display=\"block\"]");
        } else {
            body.push_str(&format!(
                "[formula display=\"block\" label=\"{}\"]",
                escape::attr(&label)
            ));
        }
        body.push_str(&self.formula_text(node));
        body.push_str("[/formula]");
        self.bit("formula", &bit_id(node), &node.parent_anchor_id, &body)
    }

    fn boxed(&mut self, node: &mut Node, modes: Modes) -> Result<()> {
        let modes = modes.with_boxed();
        for child in node.children.iter_mut() {
            if matches!(child.tag, Tag::Label | Tag::Title | Tag::Caption) {
                if self.visited.insert(child.id) {
                    self.text_block(child, modes, Family::Article, None)?;
                }
            } else {
                self.visit(child, modes)?;
            }
        }
        Ok(())
    }

    fn ref_list(&mut self, node: &mut Node, modes: Modes) -> Result<()> {
        let mut body = String::new();
        for child in &node.children {
            match child.tag {
                Tag::Title => {
                    self.visited.insert(child.id);
                    let mut rendered = String::new();
                    self.inline_children(child, modes, &mut rendered)?;
                    body.push_str(&format!(
                        "[title level=\"{}\"]{}[/title]\n",
                        node.section_level + 1,
                        rendered.trim()
                    ));
                }
                Tag::Ref => {
                    self.visited.insert(child.id);
                    let mut rendered = String::new();
                    self.inline_children(child, modes, &mut rendered)?;
                    body.push_str(&format!(
                        "[ref id=\"{}\"]{}[/ref]\n",
                        escape::attr(&bit_id(child)),
                        squash(&rendered)
                    ));
                }
                _ => {}
            }
        }
        let body = body.trim_end().to_string();
        if body.is_empty() {
            self.report.structural("ref-list.empty", bit_id(node));
        } else {
            let template = Template::select(Family::Article, modes);
            self.bit(template.bit_type(), &bit_id(node), &node.parent_anchor_id, &body)?;
        }
        for child in node.children.iter_mut() {
            if child.tag == Tag::RefList {
                self.visit(child, modes)?;
            }
        }
        Ok(())
    }

    fn standalone_graphic(&mut self, node: &mut Node) -> Result<()> {
        let Some(href) = graphic_href(node).map(str::to_string) else {
            self.report.structural("graphic.missing-href", bit_id(node));
            return Ok(());
        };
        let url = self.queue_graphic(&href)?;
        let body = format!("[image src=\"{}\"]", escape::attr(&url));
        self.bit("figure", &bit_id(node), &node.parent_anchor_id, &body)
    }

    fn loose_text(&mut self, node: &mut Node, modes: Modes) -> Result<()> {
        let text = node.text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let template = Template::select(Family::Article, modes);
        let body = escape::text(text);
        self.bit(template.bit_type(), &bit_id(node), &node.parent_anchor_id, &body)
    }

    fn loose_inline(&mut self, node: &mut Node, modes: Modes) -> Result<()> {
        let mut rendered = String::new();
        self.inline(node, modes, &mut rendered)?;
        let rendered = rendered.trim();
        if rendered.is_empty() {
            return Ok(());
        }
        let template = Template::select(Family::Article, modes);
        self.bit(template.bit_type(), &bit_id(node), &node.parent_anchor_id, rendered)
    }

    /// Render a node as inline markup.
    fn inline(&mut self, node: &Node, modes: Modes, out: &mut String) -> Result<()> {
        match &node.tag {
            Tag::Text => out.push_str(&escape::text(&node.text)),
            Tag::Bold => self.wrapped(node, modes, out, "b")?,
            Tag::Italic => self.wrapped(node, modes, out, "i")?,
            Tag::Underline => self.wrapped(node, modes, out, "u")?,
            Tag::Sup => self.wrapped(node, modes, out, "sup")?,
            Tag::Sub => self.wrapped(node, modes, out, "sub")?,
            Tag::Monospace => self.wrapped(node, modes, out, "mono")?,
            Tag::Label => {
                let mut label = String::new();
                self.inline_children(node, modes, &mut label)?;
                out.push_str(&format!("[label]{}[/label] ", label.trim()));
            }
            Tag::Xref => self.xref(node, modes, out)?,
            Tag::ExtLink => self.ext_link(node, modes, out)?,
            Tag::Std | Tag::StdDated | Tag::StdSuperseding => self.std_ref(node, modes, out)?,
            Tag::InlineFormula | Tag::Math => {
                out.push_str("[formula]");
                out.push_str(&self.formula_text(node));
                out.push_str("[/formula]");
            }
            Tag::InlineGraphic | Tag::Graphic => match graphic_href(node).map(str::to_string) {
                Some(href) => {
                    let url = self.queue_graphic(&href)?;
                    out.push_str(&format!("[image src=\"{}\" inline=\"true\"]", escape::attr(&url)));
                }
                None => self.report.structural("graphic.missing-href", node.customer_id.clone()),
            },
            Tag::Fn => {
                self.visited.insert(node.id);
                let footnote = footnote_of(node);
                out.push_str(&format!(
                    "[fn text=\"{}\"]{}[/fn]",
                    escape::attr(&footnote.text),
                    escape::text(&footnote.label)
                ));
            }
            Tag::List => {
                out.push_str(&format!("\n[list type=\"{}\"]\n", list_type(node)));
                self.inline_children(node, modes, out)?;
                out.push_str("[/list]\n");
            }
            Tag::DefList => {
                out.push_str("\n[deflist]\n");
                self.inline_children(node, modes, out)?;
                out.push_str("[/deflist]\n");
            }
            Tag::ListItem | Tag::DefItem => {
                let mut item = String::new();
                self.inline_children(node, modes, &mut item)?;
                out.push_str(&format!("[item]{}[/item]\n", item.trim()));
            }
            Tag::Term => self.wrapped(node, modes, out, "term")?,
            Tag::Def => self.wrapped(node, modes, out, "def")?,
            Tag::P => {
                let mut paragraph = String::new();
                self.inline_children(node, modes, &mut paragraph)?;
                let paragraph = paragraph.trim();
                if !paragraph.is_empty() {
                    if !out.is_empty() && !out.ends_with('\n') {
                        out.push('\n');
                    }
                    out.push_str(paragraph);
                    out.push('\n');
                }
            }
            _ => self.inline_children(node, modes, out)?,
        }
        Ok(())
    }

    fn inline_children(&mut self, node: &Node, modes: Modes, out: &mut String) -> Result<()> {
        for child in &node.children {
            self.inline(child, modes, out)?;
        }
        Ok(())
    }

    fn wrapped(&mut self, node: &Node, modes: Modes, out: &mut String, name: &str) -> Result<()> {
        out.push_str(&format!("[{name}]"));
        self.inline_children(node, modes, out)?;
        out.push_str(&format!("[/{name}]"));
        Ok(())
    }

    fn xref(&mut self, node: &Node, modes: Modes, out: &mut String) -> Result<()> {
        let rid = node.attr("rid").unwrap_or_default();
        let ref_type = node.attr("ref-type");
        let mut label = String::new();
        self.inline_children(node, modes, &mut label)?;

        if ref_type == Some("fn") {
            return self.footnote_ref(rid, &label, out);
        }
        if rid.is_empty() {
            self.report.structural("xref.missing-rid", node.customer_id.clone());
            out.push_str(&label);
            return Ok(());
        }
        let target = self.links.internal(rid, ref_type)?;
        self.link(&target, &label, &[], out);
        Ok(())
    }

    fn ext_link(&mut self, node: &Node, modes: Modes, out: &mut String) -> Result<()> {
        let target = node.attr("xlink:href").or_else(|| node.attr("href")).unwrap_or_default();
        let mut label = String::new();
        self.inline_children(node, modes, &mut label)?;
        if label.trim().is_empty() {
            label = escape::text(target);
        }
        if target.is_empty() {
            self.report.structural("ext-link.missing-href", node.customer_id.clone());
            out.push_str(&label);
            return Ok(());
        }
        if href::element_id(target).is_none() && is_web_url(target) {
            out.push_str(&format!("[url href=\"{}\"]{label}[/url]", escape::attr(target)));
            return Ok(());
        }
        let resolved = self.links.href(target)?;
        self.link(&resolved, &label, &[], out);
        Ok(())
    }

    fn std_ref(&mut self, node: &Node, modes: Modes, out: &mut String) -> Result<()> {
        let mut label = String::new();
        self.inline_children(node, modes, &mut label)?;
        let extra: &[(&str, &str)] = match node.tag {
            Tag::StdDated => &[("edition", "dated")],
            Tag::StdSuperseding => &[("relation", "supersedes")],
            _ => &[],
        };
        let target = if let Some(target) = node.attr("xlink:href") {
            self.links.href(target)?
        } else if let Some(std_id) = node.attr("std-id") {
            self.links.document(std_id)
        } else {
            out.push_str(&label);
            return Ok(());
        };
        self.link(&target, &label, extra, out);
        Ok(())
    }

    fn footnote_ref(&mut self, rid: &str, label: &str, out: &mut String) -> Result<()> {
        match self.footnotes.get(rid).cloned() {
            Some(footnote) => {
                self.visited.insert(footnote.node);
                let label = if label.trim().is_empty() {
                    escape::text(&footnote.label)
                } else {
                    label.to_string()
                };
                out.push_str(&format!(
                    "[fn text=\"{}\"]{label}[/fn]",
                    escape::attr(&footnote.text)
                ));
            }
            // Not in this partition (a back-matter fn-group). When the store
            // knows it as ours, link to its own note bit, which carries the id.
            None => {
                let target = match self.links.internal(rid, Some("fn"))? {
                    LinkTarget::Internal { .. } => LinkTarget::Internal {
                        anchor: rid.to_string(),
                    },
                    _ => LinkTarget::Unresolved {
                        key: "footnote.missing",
                        reference: rid.to_string(),
                    },
                };
                self.link(&target, label, &[], out);
            }
        }
        Ok(())
    }

    fn link(&mut self, target: &LinkTarget, label: &str, extra: &[(&str, &str)], out: &mut String) {
        if let LinkTarget::Unresolved { key, reference } = target {
            self.report.unresolved(*key, reference.clone());
        }
        out.push_str(&links::render_with_attrs(
            target,
            label,
            &self.ctx.settings.warning_marker,
            extra,
        ));
    }

    /// Converted formula text, degraded to the plain text on failure.
    fn formula_text(&mut self, node: &Node) -> String {
        let math = if node.tag == Tag::Math {
            Some(node)
        } else {
            node.find(&|n: &Node| n.tag == Tag::Math)
        };
        let Some(math) = math else {
            self.report.structural("formula.missing-math", bit_id(node));
            return escape::text(&squash(&node.plain_text()));
        };
        match math_fragment(math).and_then(|xml| self.ctx.formulas.convert(&xml)) {
            Ok(converted) => escape::text(&converted),
            Err(err) => {
                self.report
                    .structural("formula.conversion-failed", format!("{}: {err}", bit_id(node)));
                escape::text(&squash(&math.plain_text()))
            }
        }
    }

    /// Queue publication of a source graphic; returns its public URL.
    fn queue_graphic(&mut self, href: &str) -> Result<String> {
        let file = Path::new(href)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| href.to_string());
        let (filename, source) = if Path::new(&file).extension().is_some() {
            (file, self.resource_dir.join(href))
        } else {
            let extension = &self.ctx.settings.image_extension;
            (
                format!("{file}.{extension}"),
                self.resource_dir.join(format!("{href}.{extension}")),
            )
        };
        let url = asset_url(&self.ctx.settings.asset_base_url, &filename)?;
        if !self.renders.iter().any(|r| r.filename() == filename) {
            self.renders.push(RenderRequest::Graphic {
                source,
                filename,
                url: url.clone(),
            });
        }
        Ok(url)
    }

    fn placeholder(&self, key: &str, text: &str) -> String {
        format!("[warn key=\"{key}\"]{}{text}[/warn]", self.ctx.settings.warning_marker)
    }

    fn bit(&mut self, bit_type: &str, id: &str, parent: &str, body: &str) -> Result<()> {
        writeln!(
            self.out,
            "[bit type=\"{bit_type}\" id=\"{}\" parent=\"{}\"]",
            escape::attr(id),
            escape::attr(parent)
        )?;
        writeln!(self.out, "{body}")?;
        writeln!(self.out, "[/bit]")?;
        self.bits += 1;
        Ok(())
    }
}

impl<W: Write> PartitionSink for MarkupGenerator<'_, W> {
    fn begin(&mut self, header: &TreeHeader) -> Result<()> {
        if !header.document_id.is_empty() && header.document_id != self.ctx.document.id {
            self.report.structural(
                "tree.document-mismatch",
                format!("tree of {} generated as {}", header.document_id, self.ctx.document.id),
            );
        }
        if self.resource_dir.as_os_str().is_empty() {
            self.resource_dir = self.tree_dir.join(&header.resource_dir);
        }
        Ok(())
    }

    fn accept(&mut self, partition: Partition) -> Result<()> {
        self.partition(partition)
    }
}

/// Id of the bit a node is written as.
fn bit_id(node: &Node) -> String {
    if node.anchor_id.is_empty() {
        node.customer_id.clone()
    } else {
        node.anchor_id.clone()
    }
}

fn segment_id(base: &str, segment: usize) -> String {
    if segment <= 1 {
        base.to_string()
    } else {
        format!("{base}-{segment}")
    }
}

/// Collapse whitespace runs to single spaces.
fn squash(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn caption_text(node: &Node) -> String {
    let label = node.child(&Tag::Label).map(Node::plain_text).unwrap_or_default();
    let caption = node.child(&Tag::Caption).map(Node::plain_text).unwrap_or_default();
    squash(&format!("{label} {caption}"))
}

fn graphic_href(node: &Node) -> Option<&str> {
    node.attr("xlink:href")
        .or_else(|| node.attr("href"))
        .filter(|href| !href.trim().is_empty())
}

fn list_type(node: &Node) -> &str {
    match node.attr("list-type") {
        Some("order") | Some("alpha-lower") | Some("alpha-upper") | Some("roman-lower")
        | Some("roman-upper") => "order",
        Some("dash") => "dash",
        _ => "bullet",
    }
}

fn is_web_url(target: &str) -> bool {
    target.contains("://") || target.starts_with("mailto:")
}

fn footnote_of(node: &Node) -> Footnote {
    let label = node.child(&Tag::Label).map(Node::plain_text).unwrap_or_default();
    let text: String = node
        .children
        .iter()
        .filter(|child| child.tag != Tag::Label)
        .map(Node::plain_text)
        .collect::<Vec<_>>()
        .join(" ");
    Footnote {
        node: node.id,
        label: squash(&label),
        text: squash(&text),
    }
}

/// Footnotes of a partition, keyed by customer id.
fn collect_footnotes(root: &Node) -> HashMap<String, Footnote> {
    let mut footnotes = HashMap::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.tag == Tag::Fn {
            footnotes.insert(node.customer_id.clone(), footnote_of(node));
        }
        stack.extend(node.children.iter());
    }
    footnotes
}
