//! External collaborators: table rendering, formula conversion, asset
//! publishing.
//!
//! The generator never talks to these directly while walking the tree except
//! for formulas, which convert synchronously. Tables and graphics become
//! [`RenderRequest`]s queued during the walk; [`run_queue`] executes them one
//! at a time once the walk is complete and before the output is finalised.

#[cfg(feature = "native-export")]
pub mod chrome;
pub mod formula;
pub mod publisher;

#[cfg(feature = "native-export")]
pub use chrome::ChromeImageRenderer;
#[cfg(feature = "native-export")]
pub use formula::CommandFormulaConverter;
pub use formula::{math_fragment, MathTextConverter};
pub use publisher::DirectoryPublisher;

use crate::error::{FormulaError, Result};
use crate::report::Report;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Turns a flattened HTML fragment into an image file.
pub trait ImageRenderer {
    /// Render `html` and return the local path of the produced image, whose
    /// file name is `target_filename`.
    fn render(&self, html: &str, target_filename: &str) -> Result<PathBuf>;
}

/// Converts a MathML fragment into inline target markup.
pub trait FormulaConverter {
    fn convert(&self, mathml: &str) -> std::result::Result<String, FormulaError>;
}

/// Makes a local file publicly reachable and returns its URL.
pub trait AssetPublisher {
    fn publish(&self, local: &Path, public_name: &str) -> Result<String>;
}

/// Deferred work recorded by the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RenderRequest {
    /// A complex table flattened to HTML, to be rendered to an image.
    Table {
        html: String,
        filename: String,
        url: String,
    },
    /// A source graphic that only needs publishing.
    Graphic {
        source: PathBuf,
        filename: String,
        url: String,
    },
}

impl RenderRequest {
    pub fn filename(&self) -> &str {
        match self {
            RenderRequest::Table { filename, .. } | RenderRequest::Graphic { filename, .. } => {
                filename
            }
        }
    }

    /// URL already embedded in the markup for this asset.
    pub fn url(&self) -> &str {
        match self {
            RenderRequest::Table { url, .. } | RenderRequest::Graphic { url, .. } => url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedAsset {
    pub filename: String,
    pub url: String,
}

/// Execute queued requests strictly in order.
///
/// Render failures are fatal: the markup already references every asset.
/// A missing source graphic is reported and skipped.
pub fn run_queue(
    requests: &[RenderRequest],
    renderer: &dyn ImageRenderer,
    publisher: &dyn AssetPublisher,
    report: &mut Report,
) -> Result<Vec<PublishedAsset>> {
    let mut published = Vec::with_capacity(requests.len());
    for request in requests {
        let local = match request {
            RenderRequest::Table { html, filename, .. } => renderer.render(html, filename)?,
            RenderRequest::Graphic { source, .. } => {
                if !source.exists() {
                    report.structural("graphic.missing-file", source.display().to_string());
                    continue;
                }
                source.clone()
            }
        };
        let url = publisher.publish(&local, request.filename())?;
        if url != request.url() {
            report.structural(
                "asset.url-mismatch",
                format!("{}: expected {}, published {}", request.filename(), request.url(), url),
            );
        }
        tracing::debug!(filename = request.filename(), %url, "asset published");
        published.push(PublishedAsset {
            filename: request.filename().to_string(),
            url,
        });
    }
    Ok(published)
}
