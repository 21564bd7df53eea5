//! Shared fixtures for forgemirror integration tests
//!
//! "Remotes" are local bare repositories so passes run end to end without
//! touching the network.

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Command;

use forgemirror::forge::{RepoDescriptor, RepoSource};
use forgemirror::Config;

/// Whether a usable git binary is on PATH
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Run git in `dir`, panicking with stderr on failure
pub fn run_git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["-c", "user.name=fixture", "-c", "user.email=fixture@test"])
        .args(args)
        .output()
        .expect("failed to run git");

    assert!(
        output.status.success(),
        "git {:?} failed in {}: {}",
        args,
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Create a bare "remote" with one commit; returns the bare repository path.
pub fn create_remote(base: &Path, name: &str) -> PathBuf {
    let work = base.join(format!("{}-seed", name));
    std::fs::create_dir_all(&work).expect("failed to create seed directory");

    run_git(&work, &["init", "-q", "-b", "main"]);
    std::fs::write(work.join("README.md"), format!("# {}\n", name)).unwrap();
    run_git(&work, &["add", "."]);
    run_git(&work, &["commit", "-q", "-m", "initial commit"]);

    let remote = base.join(format!("{}.git", name));
    let output = Command::new("git")
        .args(["clone", "--bare", "-q"])
        .arg(&work)
        .arg(&remote)
        .output()
        .expect("failed to run git clone --bare");
    assert!(
        output.status.success(),
        "bare clone failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    remote
}

/// Add a commit to a bare remote through a scratch clone
pub fn advance_remote(base: &Path, remote: &Path, file: &str, content: &str) {
    let scratch = base.join(format!(
        "{}-scratch",
        remote.file_stem().unwrap().to_string_lossy()
    ));
    let output = Command::new("git")
        .args(["clone", "-q"])
        .arg(remote)
        .arg(&scratch)
        .output()
        .expect("failed to clone scratch copy");
    assert!(output.status.success());

    std::fs::write(scratch.join(file), content).unwrap();
    run_git(&scratch, &["add", "."]);
    run_git(&scratch, &["commit", "-q", "-m", "remote change"]);
    run_git(&scratch, &["push", "-q", "origin", "main"]);
}

/// Commit directly inside a mirrored working copy (to provoke divergence)
pub fn commit_local_change(working_copy: &Path, file: &str, content: &str) {
    std::fs::write(working_copy.join(file), content).unwrap();
    run_git(working_copy, &["add", "."]);
    run_git(working_copy, &["commit", "-q", "-m", "local change"]);
}

/// Config pointed at a temp mirror directory, tuned for fast tests
pub fn test_config(mirror_dir: &Path) -> Config {
    let mut config = Config::default();
    config.mirror_dir = mirror_dir.display().to_string();
    config.sync.timeout_secs = 60;
    config
}

/// Descriptor whose clone URL is a local bare repository
pub fn local_descriptor(full_name: &str, remote: &Path) -> RepoDescriptor {
    RepoDescriptor::new(full_name, &remote.display().to_string())
}

/// Fixed descriptor source standing in for the forge API
pub struct FixtureSource {
    pub repos: Vec<RepoDescriptor>,
}

#[async_trait]
impl RepoSource for FixtureSource {
    async fn list_repositories(&self) -> Result<Vec<RepoDescriptor>> {
        Ok(self.repos.clone())
    }
}
