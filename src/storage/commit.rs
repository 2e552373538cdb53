//!  Commit creation and history traversal
//!
//!  commits are the atomic units of change in a workspace:
//! - every file write or delete creates exactly one commit
//! - merges create one commit with the target's previous head as parent
//! - nothing here ever rewrites or deletes a commit
//!
//! history is walked along first parents only and lazily, so asking for the
//! newest few commits never touches the rest of the graph.

use chrono::{DateTime, TimeZone, Utc};
use git2::Oid;
use serde::Serialize;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::repository::GitRepository;
use crate::storage::types::{CommitId, GitSignature};

/// information about a commit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitInfo {
    #[serde(rename = "hash")]
    pub id: CommitId,
    pub parent_ids: Vec<CommitId>,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
}

impl CommitInfo {
    /// create CommitInfo from a git2::Commit
    pub(crate) fn from_git2(commit: &git2::Commit<'_>) -> Self {
        let author = commit.author();
        let time = author.when();
        let timestamp = Utc
            .timestamp_opt(time.seconds(), 0)
            .single()
            .unwrap_or_else(Utc::now);

        Self {
            id: CommitId::new(commit.id()),
            parent_ids: commit.parent_ids().map(CommitId::new).collect(),
            message: commit.message().unwrap_or("").to_string(),
            author_name: author.name().unwrap_or("Unknown").to_string(),
            author_email: author.email().unwrap_or("unknown@unknown").to_string(),
            timestamp,
        }
    }

    /// get the first (or only) parent
    pub fn first_parent(&self) -> Option<CommitId> {
        self.parent_ids.first().copied()
    }

    /// get a short summary of the commit (first line of message)
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or(&self.message)
    }
}

/// builder for creating commits with a fluent interface
pub(crate) struct CommitBuilder<'a> {
    repo: &'a GitRepository,
    tree: Option<Oid>,
    parents: Vec<CommitId>,
    message: String,
    signature: GitSignature,
    update_ref: Option<String>,
}

impl<'a> CommitBuilder<'a> {
    pub(crate) fn new(repo: &'a GitRepository) -> Self {
        Self {
            repo,
            tree: None,
            parents: Vec::new(),
            message: String::new(),
            signature: GitSignature::system(),
            update_ref: None,
        }
    }

    /// set the tree for this commit
    pub(crate) fn tree(mut self, tree: Oid) -> Self {
        self.tree = Some(tree);
        self
    }

    /// add a parent commit
    pub(crate) fn parent(mut self, parent: CommitId) -> Self {
        self.parents.push(parent);
        self
    }

    /// set the commit message
    pub(crate) fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// set the author/committer signature
    pub(crate) fn signature(mut self, signature: GitSignature) -> Self {
        self.signature = signature;
        self
    }

    /// update a ref (branch) to point to this commit
    pub(crate) fn update_ref(mut self, refname: impl Into<String>) -> Self {
        self.update_ref = Some(refname.into());
        self
    }

    /// create the commit and return its ID
    pub(crate) fn commit(self) -> StorageResult<CommitId> {
        let slug = self.repo.slug();
        let repo = self.repo.raw();

        let tree_id = self
            .tree
            .ok_or_else(|| StorageError::commit(slug, git2::Error::from_str("commit requires a tree")))?;

        let tree = repo.find_tree(tree_id).map_err(|e| StorageError::commit(slug, e))?;
        let sig = self
            .signature
            .to_git2_signature()
            .map_err(|e| StorageError::commit(slug, e))?;

        let parent_commits: Vec<git2::Commit<'_>> = self
            .parents
            .iter()
            .map(|id| repo.find_commit(id.raw()))
            .collect::<Result<_, _>>()
            .map_err(|e| StorageError::commit(slug, e))?;

        let parent_refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();

        let oid = repo
            .commit(
                self.update_ref.as_deref(),
                &sig,
                &sig,
                &self.message,
                &tree,
                &parent_refs,
            )
            .map_err(|e| StorageError::commit(slug, e))?;

        Ok(CommitId::new(oid))
    }
}

/// resolve a commit by its full hash
///
/// malformed and unknown hashes are both reported as not found.
pub fn get_commit(repo: &GitRepository, hash: &str) -> StorageResult<CommitInfo> {
    let commit = find_commit(repo, hash)?;
    Ok(CommitInfo::from_git2(&commit))
}

pub(crate) fn find_commit<'r>(repo: &'r GitRepository, hash: &str) -> StorageResult<git2::Commit<'r>> {
    let not_found = || StorageError::CommitNotFound {
        slug: repo.slug().to_string(),
        hash: hash.to_string(),
    };

    let id = CommitId::parse(hash).ok_or_else(not_found)?;
    repo.raw().find_commit(id.raw()).map_err(|e| {
        if e.code() == git2::ErrorCode::NotFound {
            not_found()
        } else {
            repo.fail(e)
        }
    })
}

/// iterate over first-parent history, newest first
///
/// each step loads exactly one commit; nothing is read ahead.
pub struct History<'repo> {
    repo: &'repo GitRepository,
    next: Option<Oid>,
}

impl<'repo> History<'repo> {
    pub(crate) fn new(repo: &'repo GitRepository, start: CommitId) -> Self {
        Self {
            repo,
            next: Some(start.raw()),
        }
    }
}

impl<'repo> Iterator for History<'repo> {
    type Item = StorageResult<CommitInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        let oid = self.next.take()?;
        match self.repo.raw().find_commit(oid) {
            Ok(commit) => {
                self.next = commit.parent_id(0).ok();
                Some(Ok(CommitInfo::from_git2(&commit)))
            }
            Err(e) => Some(Err(self.repo.fail(e))),
        }
    }
}

/// get history for a commit
pub fn history(repo: &GitRepository, start: CommitId) -> History<'_> {
    History::new(repo, start)
}

/// default messages for workspace operations
pub struct CommitMessage;

impl CommitMessage {
    /// message of the seed commit
    pub const INITIAL: &'static str = "Initial commit";

    /// default message for a file write
    pub fn update(path: &str) -> String {
        format!("Update {}", path)
    }

    /// default message for a file delete
    pub fn delete(path: &str) -> String {
        format!("Delete {}", path)
    }

    /// default message for a merge
    pub fn merge(source: &str, target: &str) -> String {
        format!("Merge branch '{}' into {}", source, target)
    }

    /// content of the README written by the seed commit
    pub fn readme(slug: &str) -> String {
        format!("# {}\n\nCreated on gitspace\n", slug)
    }
}
