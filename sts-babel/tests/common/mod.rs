//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use sts_babel::{DocumentRegistry, GeneratorSettings, LockSettings, XrefStore};
use tempfile::TempDir;

pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn fixture(name: &str) -> String {
    fs::read_to_string(fixture_path(name))
        .unwrap_or_else(|err| panic!("cannot read fixture {name}: {err}"))
}

pub fn registry() -> DocumentRegistry {
    DocumentRegistry::load(&fixture_path("registry.json")).expect("registry fixture")
}

pub fn settings() -> GeneratorSettings {
    GeneratorSettings::new("https://assets.example.org/img")
        .expect("base url")
        .with_warning_marker("! ")
}

/// A store file in a fresh temporary directory.
pub fn temp_store() -> (TempDir, XrefStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = XrefStore::open(dir.path().join("xrefs.json"), LockSettings::default())
        .expect("open store");
    (dir, store)
}
