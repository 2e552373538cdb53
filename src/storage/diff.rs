//! Tree-to-tree diffs.
//!
//! Diffs are always recomputed from two tree snapshots; nothing is cached.
//! Each changed path becomes a [`FileDiff`] carrying its unified patch and
//! the number of added and deleted lines counted from that patch.

use chrono::{DateTime, Utc};
use git2::{Delta, Diff, DiffFindOptions, DiffOptions, Patch, Tree};
use serde::Serialize;

use crate::storage::commit::{find_commit, CommitInfo};
use crate::storage::error::StorageResult;
use crate::storage::refs::RefManager;
use crate::storage::repository::GitRepository;
use crate::storage::tree::TreeHandle;
use crate::storage::types::CommitId;

/// How a path changed between the two trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl DiffStatus {
    fn from_delta(delta: Delta) -> Self {
        match delta {
            Delta::Added | Delta::Copied | Delta::Untracked => DiffStatus::Added,
            Delta::Deleted => DiffStatus::Deleted,
            Delta::Renamed => DiffStatus::Renamed,
            _ => DiffStatus::Modified,
        }
    }
}

/// One changed path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    /// new path, or the old path for a deletion
    pub path: String,
    /// previous path, only for renames
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    pub status: DiffStatus,
    pub additions: usize,
    pub deletions: usize,
    pub patch: String,
}

/// Totals over every entry of a diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffStats {
    pub files_changed: usize,
    pub additions: usize,
    pub deletions: usize,
}

impl DiffStats {
    fn sum(files: &[FileDiff]) -> Self {
        Self {
            files_changed: files.len(),
            additions: files.iter().map(|f| f.additions).sum(),
            deletions: files.iter().map(|f| f.deletions).sum(),
        }
    }
}

/// What a diff compares.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffScope {
    /// a commit against its first parent
    Commit {
        hash: CommitId,
        message: String,
        author: String,
        time: DateTime<Utc>,
    },
    /// what `source` changes relative to `target`
    Branches { source: String, target: String },
}

/// Ordered per-file diffs plus their totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffResult {
    pub scope: DiffScope,
    pub files: Vec<FileDiff>,
    pub stats: DiffStats,
}

impl DiffResult {
    fn new(scope: DiffScope, files: Vec<FileDiff>) -> Self {
        let stats = DiffStats::sum(&files);
        Self { scope, files, stats }
    }
}

/// Diff a commit against its first parent, or the empty tree for a root commit.
pub fn diff_commit(repo: &GitRepository, hash: &str) -> StorageResult<DiffResult> {
    let commit = find_commit(repo, hash)?;
    let info = CommitInfo::from_git2(&commit);

    let new_tree = commit.tree().map_err(|e| repo.fail(e))?;
    let old_tree = match commit.parent(0) {
        Ok(parent) => Some(parent.tree().map_err(|e| repo.fail(e))?),
        Err(_) => None,
    };

    let files = diff_trees(repo, old_tree.as_ref(), &new_tree)?;
    let scope = DiffScope::Commit {
        hash: info.id,
        message: info.message,
        author: info.author_name,
        time: info.timestamp,
    };
    Ok(DiffResult::new(scope, files))
}

/// Report what `source` changes relative to `target`.
///
/// An unresolvable source is not found; an unresolvable target falls back
/// to HEAD.
pub fn diff_branches(repo: &GitRepository, source: &str, target: &str) -> StorageResult<DiffResult> {
    let (_, source_commit) = RefManager::resolve_named(repo, source)?;
    let (target_commit, _) = RefManager::resolve_or_head(repo, target)?;

    let files = diff_commits(repo, target_commit, source_commit)?;
    let scope = DiffScope::Branches {
        source: source.to_string(),
        target: target.to_string(),
    };
    Ok(DiffResult::new(scope, files))
}

/// Diff the trees of two commits, `old` as baseline.
pub fn diff_commits(repo: &GitRepository, old: CommitId, new: CommitId) -> StorageResult<Vec<FileDiff>> {
    let old_tree = TreeHandle::at_commit(repo, old)?;
    let new_tree = TreeHandle::at_commit(repo, new)?;
    diff_trees(repo, Some(old_tree.inner()), new_tree.inner())
}

/// Per-file diffs between two trees, with rename detection.
pub(crate) fn diff_trees(repo: &GitRepository, old: Option<&Tree<'_>>, new: &Tree<'_>) -> StorageResult<Vec<FileDiff>> {
    let mut opts = DiffOptions::new();
    let mut diff = repo
        .raw()
        .diff_tree_to_tree(old, Some(new), Some(&mut opts))
        .map_err(|e| repo.fail(e))?;

    let mut find = DiffFindOptions::new();
    find.renames(true);
    diff.find_similar(Some(&mut find)).map_err(|e| repo.fail(e))?;

    extract_file_diffs(repo, &diff)
}

fn extract_file_diffs(repo: &GitRepository, diff: &Diff<'_>) -> StorageResult<Vec<FileDiff>> {
    let mut files = Vec::new();

    for (idx, delta) in diff.deltas().enumerate() {
        let status = DiffStatus::from_delta(delta.status());
        let new_path = delta.new_file().path().map(|p| p.to_string_lossy().into_owned());
        let old_path = delta.old_file().path().map(|p| p.to_string_lossy().into_owned());

        let path = match status {
            DiffStatus::Deleted => old_path.clone(),
            _ => new_path.clone().or_else(|| old_path.clone()),
        }
        .unwrap_or_default();

        let old_path = match status {
            DiffStatus::Renamed => old_path.filter(|old| Some(old) != new_path.as_ref()),
            _ => None,
        };

        let patch = match Patch::from_diff(diff, idx).map_err(|e| repo.fail(e))? {
            Some(mut patch) => {
                let buf = patch.to_buf().map_err(|e| repo.fail(e))?;
                String::from_utf8_lossy(&buf).into_owned()
            }
            None => String::new(),
        };

        let (additions, deletions) = count_patch_lines(&patch);

        files.push(FileDiff {
            path,
            old_path,
            status,
            additions,
            deletions,
            patch,
        });
    }

    Ok(files)
}

/// Count added and deleted lines in a unified patch.
///
/// Only lines inside hunks count: everything before the first `@@` header of
/// a file (including the `---`/`+++` markers) is skipped, and a new
/// `diff --git` header ends the current hunk.
pub fn count_patch_lines(patch: &str) -> (usize, usize) {
    let mut additions = 0;
    let mut deletions = 0;
    let mut in_hunk = false;

    for line in patch.lines() {
        if line.starts_with("diff --git ") {
            in_hunk = false;
        } else if line.starts_with("@@") {
            in_hunk = true;
        } else if in_hunk {
            match line.as_bytes().first() {
                Some(b'+') => additions += 1,
                Some(b'-') => deletions += 1,
                _ => {}
            }
        }
    }

    (additions, deletions)
}
