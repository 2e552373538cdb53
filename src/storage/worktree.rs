//! Working tree file access.
//!
//! Reads come from the live working tree, not from a commit. Writes and
//! deletes change the working tree, stage exactly that path, and commit on
//! the checked-out branch with its previous head as the only parent.
//!
//! If anything fails after the working tree was touched, the working tree
//! and index are forced back to HEAD so a failed call leaves no trace.

use std::fs;
use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use tracing::{info, warn};

use crate::storage::commit::{CommitBuilder, CommitInfo};
use crate::storage::config::EmptyCommitPolicy;
use crate::storage::error::{BackendError, StorageError, StorageResult};
use crate::storage::refs::RefManager;
use crate::storage::repository::GitRepository;
use crate::storage::tree::TreeHandle;
use crate::storage::types::{CommitId, FilePath, GitSignature};

/// Absolute location of `path` inside the working tree.
pub(crate) fn full_path(repo: &GitRepository, path: &FilePath) -> PathBuf {
    repo.workdir().join(path.to_path_buf())
}

/// Read a file from the working tree.
pub fn read_file(repo: &GitRepository, path: &FilePath) -> StorageResult<Vec<u8>> {
    let full = full_path(repo, path);
    if !full.is_file() {
        return Err(StorageError::FileNotFound {
            slug: repo.slug().to_string(),
            path: path.to_string(),
        });
    }
    fs::read(&full).map_err(|e| repo.fail(e))
}

/// Write `content` to `path`, creating parent directories, and commit it.
pub fn write_file(
    repo: &GitRepository,
    path: &FilePath,
    content: &[u8],
    message: &str,
    author: &GitSignature,
    policy: EmptyCommitPolicy,
) -> StorageResult<CommitInfo> {
    let parent = RefManager::head_commit(repo)?;

    let staged = stage_write(repo, path, content).map_err(|source| StorageError::Write {
        slug: repo.slug().to_string(),
        path: path.to_string(),
        source,
    });

    let result = staged.and_then(|tree| commit_staged(repo, path, tree, parent, message, author, policy));
    finish(repo, result)
}

/// Remove `path` from the working tree and commit the removal.
pub fn delete_file(
    repo: &GitRepository,
    path: &FilePath,
    message: &str,
    author: &GitSignature,
    policy: EmptyCommitPolicy,
) -> StorageResult<CommitInfo> {
    let full = full_path(repo, path);
    if !full.is_file() {
        return Err(StorageError::FileNotFound {
            slug: repo.slug().to_string(),
            path: path.to_string(),
        });
    }

    let parent = RefManager::head_commit(repo)?;

    let staged = stage_delete(repo, path, &full).map_err(|source| StorageError::Write {
        slug: repo.slug().to_string(),
        path: path.to_string(),
        source,
    });

    let result = staged.and_then(|tree| commit_staged(repo, path, tree, parent, message, author, policy));
    finish(repo, result)
}

fn stage_write(repo: &GitRepository, path: &FilePath, content: &[u8]) -> Result<git2::Oid, BackendError> {
    let full = full_path(repo, path);
    if let Some(dir) = full.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(&full, content)?;

    let mut index = repo.raw().index()?;
    index.add_path(Path::new(path.as_str()))?;
    index.write()?;
    Ok(index.write_tree()?)
}

fn stage_delete(repo: &GitRepository, path: &FilePath, full: &Path) -> Result<git2::Oid, BackendError> {
    fs::remove_file(full)?;
    prune_empty_dirs(repo.workdir(), full);

    let mut index = repo.raw().index()?;
    index.remove_path(Path::new(path.as_str()))?;
    index.write()?;
    Ok(index.write_tree()?)
}

/// Remove directories left empty by a delete, stopping at the work dir root.
fn prune_empty_dirs(root: &Path, removed: &Path) {
    let mut dir = removed.parent();
    while let Some(current) = dir {
        if current == root || !current.starts_with(root) {
            break;
        }
        // remove_dir only succeeds on empty directories
        if fs::remove_dir(current).is_err() {
            break;
        }
        dir = current.parent();
    }
}

fn commit_staged(
    repo: &GitRepository,
    path: &FilePath,
    tree: git2::Oid,
    parent: CommitId,
    message: &str,
    author: &GitSignature,
    policy: EmptyCommitPolicy,
) -> StorageResult<CommitInfo> {
    if policy == EmptyCommitPolicy::Reject {
        let parent_tree = TreeHandle::at_commit(repo, parent)?;
        if parent_tree.inner().id() == tree {
            return Err(StorageError::NothingToCommit {
                slug: repo.slug().to_string(),
                path: path.to_string(),
            });
        }
    }

    let id = CommitBuilder::new(repo)
        .tree(tree)
        .parent(parent)
        .message(message)
        .signature(author.clone())
        .update_ref("HEAD")
        .commit()?;

    let commit = repo.raw().find_commit(id.raw()).map_err(|e| StorageError::commit(repo.slug(), e))?;
    Ok(CommitInfo::from_git2(&commit))
}

/// Log the outcome; on failure put the working tree back to HEAD.
pub(crate) fn finish(repo: &GitRepository, result: StorageResult<CommitInfo>) -> StorageResult<CommitInfo> {
    match &result {
        Ok(commit) => info!(slug = repo.slug(), commit = %commit.id.short(), summary = commit.summary(), "committed"),
        Err(e) => {
            warn!(slug = repo.slug(), error = %e, "mutation failed, restoring working tree");
            reset_to_head(repo);
        }
    }
    result
}

/// Force the index and working tree back to the HEAD commit.
///
/// Best effort: a failure here is logged, the original error is what the
/// caller sees.
pub(crate) fn reset_to_head(repo: &GitRepository) {
    let mut checkout = CheckoutBuilder::new();
    checkout.force().remove_untracked(true);

    let restored = repo
        .raw()
        .head()
        .and_then(|head| head.peel_to_commit())
        .and_then(|commit| {
            let tree = commit.tree()?;
            let mut index = repo.raw().index()?;
            index.read_tree(&tree)?;
            index.write()?;
            repo.raw().checkout_head(Some(&mut checkout))
        });

    if let Err(e) = restored {
        warn!(slug = repo.slug(), error = %e, "failed to restore working tree");
    }
}
