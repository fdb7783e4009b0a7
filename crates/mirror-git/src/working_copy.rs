//! Local working copies of mirrored repositories
//!
//! A working copy is always left with a detached HEAD at the commit that
//! was last checked out, and is never modified beyond what `checkout`
//! writes. Rewritten manifests go into archives through overlays, not
//! through the tracked tree.

use std::path::{Path, PathBuf};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    AutotagOption, BranchType, Commit, Cred, CredentialType, Direction, FetchOptions, Oid,
    RemoteCallbacks, Repository,
};
use mirror_fs::{CacheLayout, io};

use crate::{Error, Result};

/// Refs a remote advertises, as seen by a probe.
#[derive(Debug, Clone, Default)]
struct Advertisement {
    /// `(refs/heads/<branch>, commit)` pairs
    heads: Vec<(String, Oid)>,
    /// Target of the remote's HEAD symref, e.g. `refs/heads/main`
    default_branch: Option<String>,
}

/// A cloned repository in the cache.
pub struct WorkingCopy {
    repo: Repository,
    path: PathBuf,
}

impl std::fmt::Debug for WorkingCopy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkingCopy")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl WorkingCopy {
    /// Whether a working copy exists at `path`.
    pub fn exists(path: &Path) -> bool {
        path.join(".git").exists()
    }

    /// Open the working copy at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::open(path).map_err(|_| Error::NotAWorkingCopy {
            path: path.to_path_buf(),
        })?;
        Ok(Self {
            repo,
            path: path.to_path_buf(),
        })
    }

    /// Clone `url` into `dest`.
    ///
    /// The clone is made in the cache's staging directory and renamed to
    /// `dest` only once complete; on failure nothing appears at `dest`.
    pub fn clone_into(url: &str, dest: &Path, layout: &CacheLayout) -> Result<Self> {
        let label = dest
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("working-copy");
        let staged = io::staging_dir(layout, &format!("clone-{label}"))?;

        tracing::debug!(url = %url, staging = %staged.path().display(), "Cloning into staging directory");
        RepoBuilder::new()
            .fetch_options(fetch_options())
            .clone(url, staged.path())
            .map_err(|e| Error::Clone {
                url: url.to_string(),
                message: e.message().to_string(),
            })?;

        io::promote_dir(staged, dest)?;
        Self::open(dest)
    }

    /// Path of the working copy.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The underlying repository.
    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Whether any remote advertises branch heads or a default branch that
    /// differ from the local remote-tracking refs.
    ///
    /// Only talks to the remote; nothing is downloaded.
    pub fn remote_changed(&self) -> Result<bool> {
        for remote in self.remote_names()? {
            let advertised = self.advertise(&remote)?;

            for (refname, oid) in &advertised.heads {
                let Some(branch) = refname.strip_prefix("refs/heads/") else {
                    continue;
                };
                let tracking = format!("refs/remotes/{remote}/{branch}");
                match self.repo.refname_to_id(&tracking) {
                    Ok(local) if local == *oid => {}
                    _ => return Ok(true),
                }
            }

            if let Some(default_branch) = &advertised.default_branch {
                let expected = tracking_ref(&remote, default_branch);
                let current = self
                    .repo
                    .find_reference(&format!("refs/remotes/{remote}/HEAD"))
                    .ok()
                    .and_then(|r| r.symbolic_target().map(str::to_string));
                if current.as_deref() != Some(expected.as_str()) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Fetch all branches and tags from every remote.
    ///
    /// Updates remote-tracking refs and `refs/remotes/<remote>/HEAD`; the
    /// current checkout is left alone.
    pub fn fetch_all(&self) -> Result<()> {
        for name in self.remote_names()? {
            let default_branch = match self.advertise(&name) {
                Ok(advertised) => advertised.default_branch,
                Err(e) => {
                    tracing::debug!(remote = %name, error = %e, "Could not read remote default branch");
                    None
                }
            };

            let mut remote = self.repo.find_remote(&name)?;
            let mut opts = fetch_options();
            remote
                .fetch::<&str>(&[], Some(&mut opts), None)
                .map_err(|e| Error::Fetch {
                    remote: name.clone(),
                    message: e.message().to_string(),
                })?;

            if let Some(branch) = default_branch {
                self.refresh_remote_head(&name, &branch);
            }
        }
        Ok(())
    }

    /// Force-checkout `reference` and detach HEAD at its commit.
    ///
    /// The reference is looked up as given (branch, tag, commit id or any
    /// revspec), then as `<remote>/<reference>` for every remote, so
    /// branches that only exist remotely work without a local branch.
    pub fn checkout(&self, reference: &str) -> Result<Oid> {
        let commit = self.find_commit(reference)?;
        self.checkout_commit(&commit)?;
        Ok(commit.id())
    }

    /// Force-checkout the newest commit of the remote's default branch.
    ///
    /// Falls back to the upstream of the current local branch, then to the
    /// current HEAD, when the remote HEAD is unknown.
    pub fn checkout_latest(&self) -> Result<Oid> {
        let commit = self.latest_commit()?;
        self.checkout_commit(&commit)?;
        Ok(commit.id())
    }

    /// Commit id HEAD currently points at.
    pub fn head_id(&self) -> Result<Oid> {
        Ok(self.repo.head()?.peel_to_commit()?.id())
    }

    fn find_commit(&self, reference: &str) -> Result<Commit<'_>> {
        let mut candidates = vec![reference.to_string()];
        candidates.extend(
            self.remote_names()?
                .into_iter()
                .map(|remote| format!("{remote}/{reference}")),
        );

        for candidate in &candidates {
            if let Ok(object) = self.repo.revparse_single(candidate)
                && let Ok(commit) = object.peel_to_commit()
            {
                return Ok(commit);
            }
        }

        Err(Error::ReferenceNotFound {
            reference: reference.to_string(),
        })
    }

    fn latest_commit(&self) -> Result<Commit<'_>> {
        for remote in self.remote_names()? {
            let remote_head = format!("refs/remotes/{remote}/HEAD");
            if let Ok(reference) = self.repo.find_reference(&remote_head)
                && let Ok(commit) = reference.resolve().and_then(|r| r.peel_to_commit())
            {
                return Ok(commit);
            }
        }

        let head = self.repo.head()?;
        if head.is_branch()
            && let Some(name) = head.shorthand()
            && let Ok(branch) = self.repo.find_branch(name, BranchType::Local)
            && let Ok(upstream) = branch.upstream()
        {
            return Ok(upstream.get().peel_to_commit()?);
        }

        Ok(head.peel_to_commit()?)
    }

    fn checkout_commit(&self, commit: &Commit<'_>) -> Result<()> {
        let mut builder = CheckoutBuilder::new();
        builder.force().remove_untracked(true);
        self.repo.checkout_tree(commit.as_object(), Some(&mut builder))?;
        self.repo.set_head_detached(commit.id())?;
        Ok(())
    }

    fn remote_names(&self) -> Result<Vec<String>> {
        Ok(self
            .repo
            .remotes()?
            .iter()
            .flatten()
            .map(str::to_string)
            .collect())
    }

    fn advertise(&self, name: &str) -> Result<Advertisement> {
        let mut remote = self.repo.find_remote(name)?;
        let connection = remote
            .connect_auth(Direction::Fetch, Some(remote_callbacks()), None)
            .map_err(|e| Error::Fetch {
                remote: name.to_string(),
                message: e.message().to_string(),
            })?;

        let heads = connection
            .list()?
            .iter()
            .filter(|head| head.name().starts_with("refs/heads/"))
            .map(|head| (head.name().to_string(), head.oid()))
            .collect();
        let default_branch = connection
            .default_branch()
            .ok()
            .and_then(|buf| buf.as_str().map(str::to_string));

        Ok(Advertisement {
            heads,
            default_branch,
        })
    }

    fn refresh_remote_head(&self, remote: &str, default_branch: &str) {
        let target = tracking_ref(remote, default_branch);
        if self.repo.find_reference(&target).is_err() {
            return;
        }
        if let Err(e) = self.repo.reference_symbolic(
            &format!("refs/remotes/{remote}/HEAD"),
            &target,
            true,
            "mirror: refresh remote HEAD",
        ) {
            tracing::warn!(remote = %remote, target = %target, error = %e, "Failed to refresh remote HEAD");
        }
    }
}

/// `refs/heads/<branch>` on `remote` as a local remote-tracking ref name.
fn tracking_ref(remote: &str, branch_ref: &str) -> String {
    let branch = branch_ref.strip_prefix("refs/heads/").unwrap_or(branch_ref);
    format!("refs/remotes/{remote}/{branch}")
}

fn fetch_options<'a>() -> FetchOptions<'a> {
    let mut opts = FetchOptions::new();
    opts.remote_callbacks(remote_callbacks());
    opts.download_tags(AutotagOption::All);
    opts
}

/// Credentials from the ssh agent or the git credential helpers.
///
/// libgit2 calls back until a credential works, so attempts are capped to
/// turn a rejected key into an error instead of a loop.
fn remote_callbacks<'a>() -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    let mut attempts = 0u8;
    callbacks.credentials(move |url, username, allowed| {
        attempts += 1;
        if attempts > 3 {
            return Err(git2::Error::from_str("authentication failed"));
        }
        if allowed.contains(CredentialType::SSH_KEY) {
            return Cred::ssh_key_from_agent(username.unwrap_or("git"));
        }
        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
            let config = git2::Config::open_default()?;
            return Cred::credential_helper(&config, url, username);
        }
        Cred::default()
    });
    callbacks
}
