//!  Branch and reference management.
//!
//!  Git refs are pointers to commits.  This module handles:
//! - HEAD resolution (the checked-out branch and its commit)
//! - Branch creation from the current head
//! - Branch lookup with fallback to HEAD
//! - Switching the working tree to another branch
//!
//! Branches are never deleted here; they only move when a commit is made
//! on the checked-out branch.

use git2::build::CheckoutBuilder;
use git2::BranchType;
use tracing::warn;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::repository::GitRepository;
use crate::storage::types::{BranchName, CommitId};

/// Manages Git references (branches).
pub struct RefManager;

impl RefManager {
    /// Resolve a branch name to its current commit ID.
    pub fn resolve_branch(repo: &GitRepository, branch: &BranchName) -> StorageResult<CommitId> {
        let not_found = || StorageError::BranchNotFound {
            slug: repo.slug().to_string(),
            branch: branch.to_string(),
        };

        let reference = repo
            .raw()
            .find_reference(&branch.as_ref_path())
            .map_err(|_| not_found())?;

        let commit = reference.peel_to_commit().map_err(|_| not_found())?;

        Ok(CommitId::new(commit.id()))
    }

    /// Resolve a branch given as a raw string, treating invalid names as missing.
    pub fn resolve_named(repo: &GitRepository, name: &str) -> StorageResult<(BranchName, CommitId)> {
        let branch = BranchName::new(name).map_err(|_| StorageError::BranchNotFound {
            slug: repo.slug().to_string(),
            branch: name.to_string(),
        })?;
        let commit = Self::resolve_branch(repo, &branch)?;
        Ok((branch, commit))
    }

    /// Resolve `name`, falling back to HEAD when it is missing.
    ///
    /// Returns the commit and, when the branch itself resolved, its name.
    pub fn resolve_or_head(repo: &GitRepository, name: &str) -> StorageResult<(CommitId, Option<BranchName>)> {
        match Self::resolve_named(repo, name) {
            Ok((branch, commit)) => Ok((commit, Some(branch))),
            Err(e) if e.is_not_found() => {
                warn!(slug = repo.slug(), branch = name, "branch not found, falling back to HEAD");
                Ok((Self::head_commit(repo)?, None))
            }
            Err(e) => Err(e),
        }
    }

    /// Get the current HEAD commit.
    pub fn head_commit(repo: &GitRepository) -> StorageResult<CommitId> {
        let head = repo.raw().head().map_err(|e| {
            if e.code() == git2::ErrorCode::UnbornBranch || e.code() == git2::ErrorCode::NotFound {
                StorageError::BranchNotFound {
                    slug: repo.slug().to_string(),
                    branch: "HEAD".to_string(),
                }
            } else {
                repo.fail(e)
            }
        })?;

        let commit = head.peel_to_commit().map_err(|e| repo.fail(e))?;
        Ok(CommitId::new(commit.id()))
    }

    /// The branch HEAD points at, or None when HEAD is detached.
    pub fn head_branch(repo: &GitRepository) -> StorageResult<Option<BranchName>> {
        let head = repo.raw().find_reference("HEAD").map_err(|e| repo.fail(e))?;
        Ok(head
            .symbolic_target()
            .and_then(|target| target.strip_prefix("refs/heads/"))
            .and_then(|name| BranchName::new(name).ok()))
    }

    /// Check if a branch exists.
    pub fn branch_exists(repo: &GitRepository, branch: &BranchName) -> bool {
        repo.raw().find_reference(&branch.as_ref_path()).is_ok()
    }

    /// Create a new branch pointing to the given commit.
    pub fn create_branch(repo: &GitRepository, branch: &BranchName, target: CommitId) -> StorageResult<()> {
        if Self::branch_exists(repo, branch) {
            return Err(StorageError::BranchExists {
                slug: repo.slug().to_string(),
                branch: branch.to_string(),
            });
        }

        let ref_error = |e: git2::Error| StorageError::Ref {
            slug: repo.slug().to_string(),
            branch: branch.to_string(),
            source: e.into(),
        };

        let commit = repo.raw().find_commit(target.raw()).map_err(ref_error)?;
        repo.raw().branch(branch.as_str(), &commit, false).map_err(ref_error)?;

        Ok(())
    }

    /// List all local branches, sorted by name.
    pub fn list_branches(repo: &GitRepository) -> StorageResult<Vec<BranchName>> {
        let branches = repo
            .raw()
            .branches(Some(BranchType::Local))
            .map_err(|e| repo.fail(e))?;

        let mut result = Vec::new();
        for branch_result in branches {
            let (branch, _) = branch_result.map_err(|e| repo.fail(e))?;
            if let Some(name) = branch.name().map_err(|e| repo.fail(e))? {
                if let Ok(branch_name) = BranchName::new(name) {
                    result.push(branch_name);
                }
            }
        }

        result.sort();
        Ok(result)
    }

    /// Point HEAD at `branch` and force the working tree and index to its tree.
    ///
    /// Files not tracked by the branch are removed, so the working tree ends
    /// up an exact copy of the branch head.
    pub fn checkout_branch(repo: &GitRepository, branch: &BranchName) -> StorageResult<()> {
        let ref_error = |e: git2::Error| StorageError::Ref {
            slug: repo.slug().to_string(),
            branch: branch.to_string(),
            source: e.into(),
        };

        repo.raw().set_head(&branch.as_ref_path()).map_err(ref_error)?;
        let mut checkout = CheckoutBuilder::new();
        checkout.force().remove_untracked(true);
        repo.raw().checkout_head(Some(&mut checkout)).map_err(ref_error)?;

        Ok(())
    }
}
