//! The workspace store: one long-lived owner of the storage root.
//!
//! Every operation takes the workspace slug first, validates it, takes the
//! workspace's lock (shared for reads, exclusive for mutations), opens the
//! repository for the duration of the call and drops it afterwards.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, instrument};

use crate::storage::commit::{self, CommitInfo, CommitMessage};
use crate::storage::config::StoreConfig;
use crate::storage::diff::{self, DiffResult};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::lifecycle;
use crate::storage::locator::RepositoryLocator;
use crate::storage::lock::LockRegistry;
use crate::storage::merge::{self, MergeStrategy};
use crate::storage::refs::RefManager;
use crate::storage::repository::GitRepository;
use crate::storage::tree::{FileEntry, TreeHandle};
use crate::storage::types::{BranchName, CommitId, FilePath, GitSignature, Slug};
use crate::storage::worktree;

/// The checked-out branch and the commit it points at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadInfo {
    /// None when HEAD is detached
    pub branch: Option<BranchName>,
    pub commit: CommitInfo,
}

struct StoreInner {
    config: StoreConfig,
    locator: RepositoryLocator,
    locks: LockRegistry,
}

/// Handle to every workspace under one storage root.
///
/// Cheap to clone; clones share the lock table, so concurrent calls from
/// any clone on the same workspace serialize.
#[derive(Clone)]
pub struct WorkspaceStore {
    inner: Arc<StoreInner>,
    timeout: Duration,
}

impl WorkspaceStore {
    /// Open the store, creating the root directory if needed.
    pub fn open(config: StoreConfig) -> StorageResult<Self> {
        let locator = RepositoryLocator::new(&config.root).map_err(|e| StorageError::Init {
            slug: config.root.display().to_string(),
            source: e.into(),
        })?;
        let timeout = config.lock_timeout;

        Ok(Self {
            inner: Arc::new(StoreInner {
                config,
                locator,
                locks: LockRegistry::new(),
            }),
            timeout,
        })
    }

    /// A handle sharing this store but waiting at most `timeout` for locks.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            timeout,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn root(&self) -> &std::path::Path {
        self.inner.locator.root()
    }

    /// Where the repository for `slug` lives (or would live).
    pub fn repository_path(&self, slug: &str) -> StorageResult<PathBuf> {
        let slug = Slug::new(slug)?;
        Ok(self.inner.locator.path_for(&slug))
    }

    /// Whether a repository exists for `slug`. Invalid slugs never exist.
    pub fn exists(&self, slug: &str) -> bool {
        Slug::new(slug)
            .map(|slug| self.inner.locator.path_for(&slug).is_dir())
            .unwrap_or(false)
    }

    fn read<T>(&self, slug: &str, f: impl FnOnce(&GitRepository) -> StorageResult<T>) -> StorageResult<T> {
        let slug = Slug::new(slug)?;
        self.inner.locks.read(&slug, self.timeout, || f(&self.open_repo(&slug)?))
    }

    fn write<T>(&self, slug: &str, f: impl FnOnce(&GitRepository) -> StorageResult<T>) -> StorageResult<T> {
        self.write_valid(&Slug::new(slug)?, f)
    }

    fn write_valid<T>(&self, slug: &Slug, f: impl FnOnce(&GitRepository) -> StorageResult<T>) -> StorageResult<T> {
        self.inner.locks.write(slug, self.timeout, || f(&self.open_repo(slug)?))
    }

    fn open_repo(&self, slug: &Slug) -> StorageResult<GitRepository> {
        GitRepository::open(slug, &self.inner.locator.path_for(slug))
    }

    // ==================== Lifecycle Operations ====================

    /// Create a workspace with a seed README commit on the default branch.
    #[instrument(skip(self))]
    pub fn create_repository(&self, slug: &str) -> StorageResult<PathBuf> {
        let slug = Slug::new(slug)?;
        self.inner.locks.write(&slug, self.timeout, || {
            lifecycle::create_repository(&self.inner.locator, &slug, &self.inner.config)
        })
    }

    /// Fork `from` into a new, fully independent workspace `to`.
    #[instrument(skip(self))]
    pub fn duplicate_repository(&self, from: &str, to: &str) -> StorageResult<PathBuf> {
        let from = Slug::new(from)?;
        let to = Slug::new(to)?;
        if from == to {
            return Err(StorageError::CloneTargetExists { to: to.to_string() });
        }
        self.inner.locks.read_then_write(&from, &to, self.timeout, || {
            lifecycle::duplicate_repository(&self.inner.locator, &from, &to)
        })
    }

    // ==================== File Operations ====================

    /// Read a file from the working tree.
    #[instrument(skip(self))]
    pub fn read_file(&self, slug: &str, path: &str) -> StorageResult<Vec<u8>> {
        let path = FilePath::new(path)?;
        self.read(slug, |repo| worktree::read_file(repo, &path))
    }

    /// Read a file as of a branch or a full commit hash.
    #[instrument(skip(self))]
    pub fn read_file_at(&self, slug: &str, rev: &str, path: &str) -> StorageResult<Vec<u8>> {
        let path = FilePath::new(path)?;
        self.read(slug, |repo| {
            let commit = resolve_rev(repo, rev)?;
            TreeHandle::at_commit(repo, commit)?.read_file(repo, &path)
        })
    }

    /// Write a file and commit it on the checked-out branch.
    ///
    /// An empty message becomes `Update <path>`.
    #[instrument(skip(self, content, author), fields(author = %author.email))]
    pub fn write_file(
        &self,
        slug: &str,
        path: &str,
        content: impl AsRef<[u8]>,
        message: &str,
        author: &GitSignature,
    ) -> StorageResult<CommitInfo> {
        let path = FilePath::new(path)?;
        let message = or_default(message, || CommitMessage::update(path.as_str()));
        let policy = self.inner.config.empty_commits;
        self.write(slug, |repo| {
            worktree::write_file(repo, &path, content.as_ref(), &message, author, policy)
        })
    }

    /// Delete a file and commit the removal.
    ///
    /// An empty message becomes `Delete <path>`.
    #[instrument(skip(self, author), fields(author = %author.email))]
    pub fn delete_file(
        &self,
        slug: &str,
        path: &str,
        message: &str,
        author: &GitSignature,
    ) -> StorageResult<CommitInfo> {
        let path = FilePath::new(path)?;
        let message = or_default(message, || CommitMessage::delete(path.as_str()));
        let policy = self.inner.config.empty_commits;
        self.write(slug, |repo| worktree::delete_file(repo, &path, &message, author, policy))
    }

    /// Files in the tree of `branch`, or of HEAD when absent or unknown.
    #[instrument(skip(self))]
    pub fn list_files(&self, slug: &str, branch: Option<&str>) -> StorageResult<Vec<FileEntry>> {
        self.read(slug, |repo| {
            let commit = match branch {
                Some(name) => RefManager::resolve_or_head(repo, name)?.0,
                None => RefManager::head_commit(repo)?,
            };
            TreeHandle::at_commit(repo, commit)?.list_files(repo)
        })
    }

    // ==================== History and Branch Operations ====================

    /// Up to `limit` commits from HEAD along first parents, newest first.
    #[instrument(skip(self))]
    pub fn list_commits(&self, slug: &str, limit: usize) -> StorageResult<Vec<CommitInfo>> {
        self.read(slug, |repo| {
            let head = RefManager::head_commit(repo)?;
            commit::history(repo, head).take(limit).collect()
        })
    }

    /// Look up one commit by full hash.
    #[instrument(skip(self))]
    pub fn get_commit(&self, slug: &str, hash: &str) -> StorageResult<CommitInfo> {
        self.read(slug, |repo| commit::get_commit(repo, hash))
    }

    /// The checked-out branch and its head commit.
    #[instrument(skip(self))]
    pub fn head(&self, slug: &str) -> StorageResult<HeadInfo> {
        self.read(slug, |repo| {
            let id = RefManager::head_commit(repo)?;
            let commit = commit::get_commit(repo, &id.to_string())?;
            Ok(HeadInfo {
                branch: RefManager::head_branch(repo)?,
                commit,
            })
        })
    }

    /// Create a branch at the current head commit.
    #[instrument(skip(self))]
    pub fn create_branch(&self, slug: &str, name: &str) -> StorageResult<()> {
        let slug = Slug::new(slug)?;
        let branch = BranchName::new(name).map_err(|_| StorageError::InvalidBranchName {
            slug: slug.to_string(),
            name: name.to_string(),
        })?;
        self.write_valid(&slug, |repo| {
            let head = RefManager::head_commit(repo)?;
            RefManager::create_branch(repo, &branch, head)?;
            info!(slug = repo.slug(), branch = %branch, commit = %head, "created branch");
            Ok(())
        })
    }

    /// All local branches, sorted by name.
    #[instrument(skip(self))]
    pub fn list_branches(&self, slug: &str) -> StorageResult<Vec<BranchName>> {
        self.read(slug, RefManager::list_branches)
    }

    // ==================== Diff and Merge Operations ====================

    /// What a commit changed relative to its first parent.
    #[instrument(skip(self))]
    pub fn diff_commit(&self, slug: &str, hash: &str) -> StorageResult<DiffResult> {
        self.read(slug, |repo| diff::diff_commit(repo, hash))
    }

    /// What `source` changes relative to `target`.
    #[instrument(skip(self))]
    pub fn diff_branches(&self, slug: &str, source: &str, target: &str) -> StorageResult<DiffResult> {
        self.read(slug, |repo| diff::diff_branches(repo, source, target))
    }

    /// Merge `source` into `target` with the overwrite-union strategy.
    pub fn merge(
        &self,
        slug: &str,
        source: &str,
        target: &str,
        author: &GitSignature,
        message: Option<&str>,
    ) -> StorageResult<CommitInfo> {
        self.merge_with(slug, source, target, author, message, MergeStrategy::default())
    }

    /// Merge `source` into `target` with an explicit strategy.
    #[instrument(skip(self, author), fields(author = %author.email))]
    pub fn merge_with(
        &self,
        slug: &str,
        source: &str,
        target: &str,
        author: &GitSignature,
        message: Option<&str>,
        strategy: MergeStrategy,
    ) -> StorageResult<CommitInfo> {
        self.write(slug, |repo| merge::merge(repo, source, target, author, message, strategy))
    }
}

/// A full commit hash, else a branch name.
fn resolve_rev(repo: &GitRepository, rev: &str) -> StorageResult<CommitId> {
    if CommitId::parse(rev).is_some() {
        return Ok(CommitId::new(commit::find_commit(repo, rev)?.id()));
    }
    Ok(RefManager::resolve_named(repo, rev)?.1)
}

fn or_default(message: &str, default: impl FnOnce() -> String) -> String {
    if message.trim().is_empty() {
        default()
    } else {
        message.to_string()
    }
}
