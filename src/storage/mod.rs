//! storage layer for gitspace
//!
//! this module is the whole workspace engine: every workspace is a non-bare
//! git repository at `<root>/<slug>.git`, and every mutation is a commit.
//! Callers only see [`WorkspaceStore`]; nothing outside this module touches
//! git2 directly.
//!
//!  # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     WorkspaceStore                          │
//! │  (slug validation, per-workspace locks, one call = one op)  │
//! └─────────────────────────────────────────────────────────────┘
//!          │                │                 │              │
//!          ▼                ▼                 ▼              ▼
//!   ┌────────────┐   ┌────────────┐   ┌────────────┐  ┌────────────┐
//!   │ lifecycle  │   │  worktree  │   │    diff    │  │   merge    │
//!   │(create/fork│   │(read/write │   │ (trees vs  │  │ (overwrite │
//!   │            │   │  /delete)  │   │   trees)   │  │   union)   │
//!   └────────────┘   └────────────┘   └────────────┘  └────────────┘
//!          │                │                 │              │
//!          └────────────────┼─────────────────┼──────────────┘
//!                           ▼                 ▼
//!                    ┌─────────────┐   ┌─────────────┐
//!                    │   commit    │   │  refs/tree  │
//!                    │  (history)  │   │ (branches)  │
//!                    └─────────────┘   └─────────────┘
//!  ```
//!
//! # Usage
//!
//! ```no_run
//! use gitspace::storage::{GitSignature, StoreConfig, WorkspaceStore};
//!
//! let store = WorkspaceStore::open(StoreConfig::new("./repos"))?;
//! store.create_repository("notes")?;
//!
//! let author = GitSignature::new("Ada", "ada@example.com");
//! let commit = store.write_file("notes", "a.txt", "hello", "", &author)?;
//!
//! let diff = store.diff_commit("notes", &commit.id.to_string())?;
//! assert_eq!(diff.stats.additions, 1);
//! # Ok::<(), gitspace::storage::StorageError>(())
//! ```

mod commit;
mod config;
mod diff;
mod error;
mod lifecycle;
mod locator;
mod lock;
mod merge;
mod refs;
mod repository;
mod store;
mod tree;
mod types;
mod worktree;

// Re-export public API
pub use commit::{CommitInfo, CommitMessage};
pub use config::{EmptyCommitPolicy, StoreConfig};
pub use diff::{count_patch_lines, DiffResult, DiffScope, DiffStats, DiffStatus, FileDiff};
pub use error::{BackendError, ErrorKind, StorageError, StorageResult};
pub use locator::RepositoryLocator;
pub use merge::MergeStrategy;
pub use store::{HeadInfo, WorkspaceStore};
pub use tree::FileEntry;
pub use types::{BranchName, CommitId, FilePath, GitSignature, InvalidNameError, Slug};
