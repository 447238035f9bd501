//! Filesystem asset publisher.

use super::AssetPublisher;
use crate::error::{ConvertError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Copies assets into a directory served under `base_url`.
#[derive(Debug, Clone)]
pub struct DirectoryPublisher {
    dir: PathBuf,
    base_url: Url,
}

impl DirectoryPublisher {
    pub fn new(dir: impl Into<PathBuf>, base_url: &str) -> Result<Self> {
        let base_url = asset_base(base_url)?;
        Ok(DirectoryPublisher {
            dir: dir.into(),
            base_url,
        })
    }
}

impl AssetPublisher for DirectoryPublisher {
    fn publish(&self, local: &Path, public_name: &str) -> Result<String> {
        fs::create_dir_all(&self.dir)?;
        let target = self.dir.join(public_name);
        if local != target {
            fs::copy(local, &target)?;
        }
        asset_url(&self.base_url, public_name)
    }
}

/// Parse a base URL for assets, forcing a trailing slash so joins append.
pub fn asset_base(base: &str) -> Result<Url> {
    let normalized = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    };
    Url::parse(&normalized)
        .map_err(|err| ConvertError::Render(format!("invalid asset base URL '{base}': {err}")))
}

pub fn asset_url(base: &Url, filename: &str) -> Result<String> {
    base.join(filename)
        .map(String::from)
        .map_err(|err| ConvertError::Render(format!("cannot build asset URL for '{filename}': {err}")))
}
