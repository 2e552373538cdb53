//! Store configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{BranchName, GitSignature};

/// What a mutation does when it stages no change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyCommitPolicy {
    /// fail with `NothingToCommit` and leave the branch where it was
    #[default]
    Reject,
    /// record a commit whose tree equals its parent's
    Allow,
}

/// Workspace store configuration options.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base directory holding one `<slug>.git` directory per workspace.
    pub root: PathBuf,
    /// Branch created by `create_repository` and checked out afterwards.
    pub default_branch: BranchName,
    /// Longest a call waits for the per-workspace lock.
    pub lock_timeout: Duration,
    /// Behaviour for writes that change nothing.
    pub empty_commits: EmptyCommitPolicy,
    /// Author of the seed commit.
    pub system_signature: GitSignature,
}

impl StoreConfig {
    pub const ROOT_ENV: &'static str = "REPOS_PATH";
    pub const DEFAULT_BRANCH_ENV: &'static str = "GITSPACE_DEFAULT_BRANCH";
    pub const LOCK_TIMEOUT_ENV: &'static str = "GITSPACE_LOCK_TIMEOUT_MS";

    const DEFAULT_ROOT: &'static str = "./repos";
    const DEFAULT_BRANCH: &'static str = "main";
    const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a new configuration with the given root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Build a configuration from the process environment.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> StorageResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> StorageResult<Self> {
        let mut config = Self::default();

        if let Some(root) = lookup(Self::ROOT_ENV).filter(|v| !v.is_empty()) {
            config.root = PathBuf::from(root);
        }

        if let Some(branch) = lookup(Self::DEFAULT_BRANCH_ENV).filter(|v| !v.is_empty()) {
            config.default_branch = BranchName::new(branch.as_str()).map_err(|e| {
                StorageError::InvalidConfig(format!("{}: {}", Self::DEFAULT_BRANCH_ENV, e))
            })?;
        }

        if let Some(ms) = lookup(Self::LOCK_TIMEOUT_ENV).filter(|v| !v.is_empty()) {
            let ms: u64 = ms.trim().parse().map_err(|_| {
                StorageError::InvalidConfig(format!(
                    "{} must be a number of milliseconds, got {:?}",
                    Self::LOCK_TIMEOUT_ENV,
                    ms
                ))
            })?;
            config.lock_timeout = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// Set the default branch.
    pub fn default_branch(mut self, branch: BranchName) -> Self {
        self.default_branch = branch;
        self
    }

    /// Set the lock timeout.
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Set the empty commit policy.
    pub fn empty_commits(mut self, policy: EmptyCommitPolicy) -> Self {
        self.empty_commits = policy;
        self
    }

    /// Set the seed commit author.
    pub fn system_signature(mut self, signature: GitSignature) -> Self {
        self.system_signature = signature;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(Self::DEFAULT_ROOT),
            default_branch: BranchName(Self::DEFAULT_BRANCH.to_string()),
            lock_timeout: Self::DEFAULT_LOCK_TIMEOUT,
            empty_commits: EmptyCommitPolicy::default(),
            system_signature: GitSignature::system(),
        }
    }
}
