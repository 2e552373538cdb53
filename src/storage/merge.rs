//! Branch merging.
//!
//! The only strategy is [`MergeStrategy::OverwriteUnion`]: every file of the
//! source branch is written over the target's working tree and the result
//! is committed on the target with a single parent. Files only the target
//! has are kept, and when both sides changed a file the source wins. There
//! is no conflict detection.

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::storage::commit::{CommitBuilder, CommitInfo, CommitMessage};
use crate::storage::error::{BackendError, StorageError, StorageResult};
use crate::storage::refs::RefManager;
use crate::storage::repository::GitRepository;
use crate::storage::tree::{BlobEntry, TreeHandle};
use crate::storage::types::{BranchName, CommitId, GitSignature};
use crate::storage::worktree;

/// How a merge combines the source into the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    /// copy every source file over the target, keep target-only files
    #[default]
    OverwriteUnion,
}

/// Merge `source` into `target` and commit on the target.
///
/// The target is checked out first; if it does not exist (or cannot be
/// checked out) the merge lands on whatever HEAD currently is. The target
/// stays checked out after a successful merge. When the merge fails, HEAD,
/// the index and the working tree go back to where they were before the
/// call.
pub fn merge(
    repo: &GitRepository,
    source: &str,
    target: &str,
    author: &GitSignature,
    message: Option<&str>,
    strategy: MergeStrategy,
) -> StorageResult<CommitInfo> {
    let source_commit = BranchName::new(source)
        .ok()
        .and_then(|branch| RefManager::resolve_branch(repo, &branch).ok())
        .ok_or_else(|| StorageError::MergeSourceMissing {
            slug: repo.slug().to_string(),
            branch: source.to_string(),
        })?;
    let blobs = TreeHandle::at_commit(repo, source_commit)?.blobs(repo)?;

    let previous = PreviousHead::capture(repo)?;
    checkout_target(repo, target, &previous);

    let merge_error = |source_err: BackendError| StorageError::Merge {
        slug: repo.slug().to_string(),
        from_branch: source.to_string(),
        into_branch: target.to_string(),
        source: source_err,
    };

    let message = match message {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => CommitMessage::merge(source, target),
    };

    let result = RefManager::head_commit(repo)
        .and_then(|parent| {
            let tree = match strategy {
                MergeStrategy::OverwriteUnion => apply_overwrite_union(repo, &blobs).map_err(merge_error)?,
            };
            CommitBuilder::new(repo)
                .tree(tree)
                .parent(parent)
                .message(message)
                .signature(author.clone())
                .update_ref("HEAD")
                .commit()
                .map_err(|e| match e {
                    StorageError::Commit { source: err, .. } => merge_error(err),
                    other => other,
                })
        })
        .and_then(|id| {
            let commit = repo.raw().find_commit(id.raw()).map_err(|e| merge_error(e.into()))?;
            Ok(CommitInfo::from_git2(&commit))
        });

    match result {
        Ok(commit) => {
            info!(
                slug = repo.slug(),
                from = source,
                into = target,
                commit = %commit.id.short(),
                parent = ?commit.first_parent().map(|p| p.short()),
                "merged"
            );
            Ok(commit)
        }
        Err(e) => {
            warn!(slug = repo.slug(), from = source, into = target, error = %e, "merge failed, restoring previous HEAD");
            previous.restore(repo);
            Err(e)
        }
    }
}

/// Where HEAD pointed before a merge touched it.
struct PreviousHead {
    branch: Option<BranchName>,
    commit: CommitId,
}

impl PreviousHead {
    fn capture(repo: &GitRepository) -> StorageResult<Self> {
        Ok(Self {
            branch: RefManager::head_branch(repo)?,
            commit: RefManager::head_commit(repo)?,
        })
    }

    /// Clean up whatever the merge left behind, then put HEAD back.
    ///
    /// Best effort: failures are logged, the caller keeps its own error.
    fn restore(&self, repo: &GitRepository) {
        worktree::reset_to_head(repo);

        let restored = match &self.branch {
            Some(branch) => RefManager::checkout_branch(repo, branch),
            None => repo
                .raw()
                .set_head_detached(self.commit.raw())
                .map_err(|e| repo.fail(e))
                .map(|()| worktree::reset_to_head(repo)),
        };

        if let Err(e) = restored {
            warn!(slug = repo.slug(), error = %e, "failed to restore previous HEAD");
        }
    }
}

/// Check out `target`, or stay on HEAD when that is not possible.
fn checkout_target(repo: &GitRepository, target: &str, previous: &PreviousHead) {
    let Ok(branch) = BranchName::new(target) else {
        warn!(slug = repo.slug(), into = target, "invalid target branch, merging into HEAD");
        return;
    };

    if !RefManager::branch_exists(repo, &branch) {
        warn!(slug = repo.slug(), into = target, "target branch not found, merging into HEAD");
        return;
    }

    if let Err(e) = RefManager::checkout_branch(repo, &branch) {
        warn!(slug = repo.slug(), into = target, error = %e, "target checkout failed, merging into HEAD");
        previous.restore(repo);
    }
}

/// Write every regular file of the source over the working tree and stage it.
fn apply_overwrite_union(repo: &GitRepository, blobs: &[BlobEntry]) -> Result<git2::Oid, BackendError> {
    let mut index = repo.raw().index()?;

    for entry in blobs {
        if !entry.is_regular() {
            debug!(slug = repo.slug(), path = %entry.path, mode = entry.mode, "skipping non-regular entry");
            continue;
        }

        let blob = repo.raw().find_blob(entry.blob.raw())?;
        let full = repo.workdir().join(&entry.path);
        if let Some(dir) = full.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&full, blob.content())?;
        set_executable(&full, entry.is_executable())?;

        index.add_path(Path::new(&entry.path))?;
    }

    index.write()?;
    Ok(index.write_tree()?)
}

#[cfg(unix)]
fn set_executable(path: &Path, executable: bool) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)?.permissions();
    let mode = if executable { 0o755 } else { 0o644 };
    if perms.mode() & 0o777 != mode {
        perms.set_mode(mode);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path, _executable: bool) -> std::io::Result<()> {
    Ok(())
}
