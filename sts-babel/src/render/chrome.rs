//! Table rendering through headless Chrome.
//!
//! The flattened table fragment is wrapped in a minimal HTML page and
//! captured with Chrome's `--screenshot` mode.

use super::ImageRenderer;
use crate::error::{ConvertError, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;
use url::Url;
use which::which;

const TABLE_CSS: &str = concat!(
    "body { margin: 8px; background: white; font-family: 'Helvetica Neue', Arial, sans-serif; font-size: 13px; }\n",
    "table { border-collapse: collapse; }\n",
    "th, td { border: 1px solid #444; padding: 3px 6px; vertical-align: top; }\n",
    ".formula { font-style: italic; }\n",
    ".private-use { font-family: monospace; color: #a00; }\n"
);

#[derive(Debug, Clone)]
pub struct ChromeImageRenderer {
    chrome: Option<PathBuf>,
    output_dir: PathBuf,
    viewport: (u32, u32),
}

impl ChromeImageRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        ChromeImageRenderer {
            chrome: None,
            output_dir: output_dir.into(),
            viewport: (1280, 960),
        }
    }

    /// Use an explicit Chrome binary instead of discovering one.
    pub fn with_binary(mut self, chrome: impl Into<PathBuf>) -> Self {
        self.chrome = Some(chrome.into());
        self
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = (width, height);
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl ImageRenderer for ChromeImageRenderer {
    fn render(&self, html: &str, target_filename: &str) -> Result<PathBuf> {
        let chrome = match &self.chrome {
            Some(chrome) => chrome.clone(),
            None => resolve_chrome_binary()?,
        };
        fs::create_dir_all(&self.output_dir)?;

        let temp_dir = tempdir()?;
        let html_path = temp_dir.path().join("table.html");
        fs::write(&html_path, table_page(html))?;
        let file_url = Url::from_file_path(&html_path).map_err(|_| {
            ConvertError::Render("failed to construct file:// URL for table page".to_string())
        })?;

        let png_path = self.output_dir.join(target_filename);
        let (width, height) = self.viewport;
        let status = Command::new(&chrome)
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--hide-scrollbars")
            .arg(format!("--screenshot={}", png_path.display()))
            .arg(format!("--window-size={width},{height}"))
            .arg(file_url.as_str())
            .status()
            .map_err(|e| {
                ConvertError::Render(format!(
                    "failed to launch Chrome ({}): {e}",
                    chrome.display()
                ))
            })?;

        if !status.success() {
            return Err(ConvertError::Render(format!(
                "Chrome exited with status {status} while rendering {target_filename}"
            )));
        }
        tracing::debug!(file = %png_path.display(), "table rendered");
        Ok(png_path)
    }
}

/// Wrap a table fragment in a standalone page.
pub fn table_page(fragment: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><style>\n{TABLE_CSS}</style></head>\n<body>{fragment}</body></html>\n"
    )
}

fn resolve_chrome_binary() -> Result<PathBuf> {
    for var in ["STS_CHROME_BIN", "GOOGLE_CHROME_BIN", "CHROME_BIN"] {
        if let Some(path) = env::var_os(var) {
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
    }

    for candidate in [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
        "chrome",
        "msedge",
    ] {
        if let Ok(path) = which(candidate) {
            return Ok(path);
        }
    }

    Err(ConvertError::Render(
        "unable to locate Chrome/Chromium; set STS_CHROME_BIN or render.chrome_binary".to_string(),
    ))
}
