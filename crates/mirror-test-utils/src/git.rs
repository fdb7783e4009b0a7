//! Source repositories standing in for the mirrored remotes.
//!
//! Built with the `git` CLI so the fixtures exercise a real object store
//! and real branch, tag and symlink handling. The mirror clones them by
//! local path, which `git2` treats like any other transport.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use crate::manifest::package_manifest;

/// A git repository in a temporary directory with a `main` branch.
pub struct RemoteRepo {
    temp_dir: TempDir,
}

impl RemoteRepo {
    /// Create a repository whose first commit holds a `package.json`,
    /// an `index.js` and an executable `bin/run.sh`.
    ///
    /// # Panics
    /// Panics if any git operation fails.
    pub fn new(name: &str, version: &str, dependencies: &[(&str, &str)]) -> Self {
        let repo = Self {
            temp_dir: TempDir::new().unwrap(),
        };

        repo.git(&["init", "-q"]);
        // Fix the branch name regardless of the installed git's init.defaultBranch
        repo.git(&["symbolic-ref", "HEAD", "refs/heads/main"]);
        repo.git(&["config", "user.email", "test@test.com"]);
        repo.git(&["config", "user.name", "Test User"]);
        repo.git(&["config", "commit.gpgsign", "false"]);

        repo.write_file("package.json", &package_manifest(name, version, dependencies));
        repo.write_file("index.js", "module.exports = 42;\n");
        repo.write_file("bin/run.sh", "#!/bin/sh\necho run\n");
        repo.make_executable("bin/run.sh");
        repo.commit("Initial commit");
        repo
    }

    /// Root of the repository.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Location to hand to the mirror as the remote.
    pub fn url(&self) -> String {
        self.path().display().to_string()
    }

    /// Write `content` to `rel`, creating parent directories.
    pub fn write_file(&self, rel: &str, content: &str) {
        let path: PathBuf = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content)
            .unwrap_or_else(|e| panic!("RemoteRepo: failed to write {}: {e}", path.display()));
    }

    /// Set the executable bits on `rel`.
    pub fn make_executable(&self, rel: &str) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let path = self.path().join(rel);
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        #[cfg(not(unix))]
        {
            self.git(&["update-index", "--add", "--chmod=+x", rel]);
        }
    }

    /// Stage everything and commit. Returns the new commit id.
    pub fn commit(&self, message: &str) -> String {
        self.git(&["add", "-A"]);
        self.git(&["commit", "-q", "-m", message]);
        self.head()
    }

    /// Full id of the commit HEAD points at.
    pub fn head(&self) -> String {
        self.git(&["rev-parse", "HEAD"])
    }

    /// Create `branch` at HEAD and switch to it.
    pub fn create_branch(&self, branch: &str) {
        self.git(&["checkout", "-q", "-b", branch]);
    }

    /// Switch to an existing branch.
    pub fn switch(&self, branch: &str) {
        self.git(&["checkout", "-q", branch]);
    }

    /// Create a lightweight tag at HEAD.
    pub fn tag(&self, name: &str) {
        self.git(&["tag", name]);
    }

    /// Run git in the repository and return trimmed stdout.
    ///
    /// # Panics
    /// Panics if git cannot be spawned or exits unsuccessfully.
    pub fn git(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .unwrap_or_else(|e| panic!("RemoteRepo: failed to run `git {args:?}`: {e}"));
        if !output.status.success() {
            panic!(
                "RemoteRepo: `git {args:?}` failed:\n{}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }
}
