//! Storage layer error types
//!
//! All errors that can occur during workspace storage operations are defined here.
//! Every variant carries the slug (and the path, hash or branch involved) so the
//! calling layer can build a user-facing message without re-deriving context.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::storage::types::InvalidNameError;

/// low-level failure underneath a storage operation
///
/// never returned on its own, it is always wrapped in the [`StorageError`]
/// variant for the phase it happened in.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Git(#[from] git2::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Walk(#[from] walkdir::Error),
}

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// no repository exists for the slug
    #[error("workspace not found: {slug}")]
    RepositoryNotFound { slug: String },

    /// the file is absent from the working tree (or the requested tree)
    #[error("file not found: {slug}:{path}")]
    FileNotFound { slug: String, path: String },

    /// the hash is malformed or not in the object store
    #[error("commit not found: {slug}@{hash}")]
    CommitNotFound { slug: String, hash: String },

    /// the branch does not exist
    #[error("branch not found: {slug}:{branch}")]
    BranchNotFound { slug: String, branch: String },

    /// create collided with an existing repository
    #[error("workspace already exists: {slug} at {}", path.display())]
    AlreadyExists { slug: String, path: PathBuf },

    /// repository initialization failed
    #[error("failed to initialize workspace {slug}: {source}")]
    Init {
        slug: String,
        #[source]
        source: BackendError,
    },

    /// duplication source does not exist
    #[error("cannot fork {from}: source workspace does not exist")]
    CloneSourceMissing { from: String },

    /// duplication target path is already occupied
    #[error("cannot fork into {to}: target workspace already exists")]
    CloneTargetExists { to: String },

    /// the recursive copy failed
    #[error("failed to fork {from} into {to}: {source}")]
    Clone {
        from: String,
        to: String,
        #[source]
        source: BackendError,
    },

    /// writing or staging the working tree failed
    #[error("failed to write {slug}:{path}: {source}")]
    Write {
        slug: String,
        path: String,
        #[source]
        source: BackendError,
    },

    /// the mutation staged no change and empty commits are rejected
    #[error("nothing to commit in {slug}: {path} is unchanged")]
    NothingToCommit { slug: String, path: String },

    /// creating the commit object or advancing the branch failed
    #[error("failed to commit to {slug}: {source}")]
    Commit {
        slug: String,
        #[source]
        source: BackendError,
    },

    /// the branch name is not a valid git ref name
    #[error("invalid branch name in {slug}: {name:?}")]
    InvalidBranchName { slug: String, name: String },

    /// the branch already exists
    #[error("branch already exists: {slug}:{branch}")]
    BranchExists { slug: String, branch: String },

    /// reference manipulation failed
    #[error("failed to update ref {branch} in {slug}: {source}")]
    Ref {
        slug: String,
        branch: String,
        #[source]
        source: BackendError,
    },

    /// the merge source branch could not be resolved
    #[error("cannot merge in {slug}: source branch {branch} not found")]
    MergeSourceMissing { slug: String, branch: String },

    /// applying the source tree or committing the merge failed
    #[error("failed to merge {from_branch} into {into_branch} in {slug}: {source}")]
    Merge {
        slug: String,
        from_branch: String,
        into_branch: String,
        #[source]
        source: BackendError,
    },

    /// the per-repository lock could not be acquired in time
    #[error("timed out after {waited:?} waiting for workspace {slug}")]
    Timeout { slug: String, waited: Duration },

    /// a slug or path failed validation
    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    /// configuration could not be loaded
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// a read-path failure in the object store or filesystem
    #[error("storage failure in {slug}: {source}")]
    Backend {
        slug: String,
        #[source]
        source: BackendError,
    },
}

/// coarse classification of a [`StorageError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Init,
    Clone,
    Write,
    Commit,
    Ref,
    Merge,
    Timeout,
    InvalidInput,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Init => "init_error",
            ErrorKind::Clone => "clone_error",
            ErrorKind::Write => "write_error",
            ErrorKind::Commit => "commit_error",
            ErrorKind::Ref => "ref_error",
            ErrorKind::Merge => "merge_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl StorageError {
    /// classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::RepositoryNotFound { .. }
            | StorageError::FileNotFound { .. }
            | StorageError::CommitNotFound { .. }
            | StorageError::BranchNotFound { .. } => ErrorKind::NotFound,
            StorageError::AlreadyExists { .. } | StorageError::Init { .. } => ErrorKind::Init,
            StorageError::CloneSourceMissing { .. }
            | StorageError::CloneTargetExists { .. }
            | StorageError::Clone { .. } => ErrorKind::Clone,
            StorageError::Write { .. } => ErrorKind::Write,
            StorageError::NothingToCommit { .. } | StorageError::Commit { .. } => ErrorKind::Commit,
            StorageError::InvalidBranchName { .. }
            | StorageError::BranchExists { .. }
            | StorageError::Ref { .. } => ErrorKind::Ref,
            StorageError::MergeSourceMissing { .. } | StorageError::Merge { .. } => ErrorKind::Merge,
            StorageError::Timeout { .. } => ErrorKind::Timeout,
            StorageError::InvalidName(_) | StorageError::InvalidConfig(_) => ErrorKind::InvalidInput,
            StorageError::Backend { .. } => ErrorKind::Internal,
        }
    }

    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// check if this error should be reported as a bad request
    pub fn is_bad_request(&self) -> bool {
        matches!(self.kind(), ErrorKind::Ref | ErrorKind::InvalidInput)
    }

    /// check if this error is a lock timeout
    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    pub(crate) fn backend(slug: &str, source: impl Into<BackendError>) -> Self {
        StorageError::Backend {
            slug: slug.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn commit(slug: &str, source: impl Into<BackendError>) -> Self {
        StorageError::Commit {
            slug: slug.to_string(),
            source: source.into(),
        }
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let not_found = StorageError::FileNotFound {
            slug: "demo".into(),
            path: "a.txt".into(),
        };
        assert!(not_found.is_not_found());
        assert!(!not_found.is_bad_request());

        let bad_branch = StorageError::InvalidBranchName {
            slug: "demo".into(),
            name: "a..b".into(),
        };
        assert_eq!(bad_branch.kind(), ErrorKind::Ref);
        assert!(bad_branch.is_bad_request());

        let timeout = StorageError::Timeout {
            slug: "demo".into(),
            waited: Duration::from_millis(5),
        };
        assert!(timeout.is_timeout());
        assert!(!timeout.is_not_found());
    }

    #[test]
    fn test_merge_source_missing_is_merge_error() {
        let err = StorageError::MergeSourceMissing {
            slug: "demo".into(),
            branch: "feature".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Merge);
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_messages_carry_context() {
        let err = StorageError::commit("demo", git2::Error::from_str("boom"));
        let text = err.to_string();
        assert!(text.contains("demo"));
        assert!(text.contains("boom"));
        assert_eq!(ErrorKind::Commit.to_string(), "commit_error");
    }
}
