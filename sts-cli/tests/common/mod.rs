#![allow(dead_code)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("sts-babel")
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn toml_path(path: &Path) -> String {
    path.display().to_string().replace('\\', "/")
}

/// A working directory with an `sts.toml` pointing the store into it and the
/// registry at the shared fixture.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempdir().unwrap();
        let config = format!(
            "[store]\npath = \"{}\"\nlock_timeout_ms = 2000\n\n\
             [registry]\npath = \"{}\"\n\n\
             [generator]\nasset_base_url = \"https://assets.example.org/img\"\nwarning_marker = \"! \"\n",
            toml_path(&dir.path().join("xrefs.json")),
            toml_path(&fixture_path("registry.json")),
        );
        fs::write(dir.path().join("sts.toml"), config).unwrap();
        Workspace { dir }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// `stsconv` run from inside the workspace, so `sts.toml` is picked up.
    pub fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("stsconv");
        cmd.current_dir(self.dir.path())
            .env_remove("RUST_LOG")
            .arg("--log-level")
            .arg("warn");
        cmd
    }

    pub fn convert(&self, document: &str, fixture: &str) -> String {
        let output = self
            .cmd()
            .arg("convert")
            .arg(document)
            .arg(fixture_path(fixture))
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        String::from_utf8(output).unwrap()
    }
}
