//! gitspace - git-backed workspace storage
//!
//! Each workspace is a named, version-controlled file tree. Every file
//! write or delete is a commit, workspaces can be branched, diffed, forked
//! and merged, and the full history lives in the workspace's `.git/`.
//!
//! # Example
//!
//! ```no_run
//! use gitspace::{GitSignature, StoreConfig, WorkspaceStore};
//!
//! let store = WorkspaceStore::open(StoreConfig::from_env().unwrap()).unwrap();
//! store.create_repository("notes").unwrap();
//! store
//!     .write_file("notes", "todo.md", "- ship it\n", "", &GitSignature::new("Ada", "ada@example.com"))
//!     .unwrap();
//! ```

pub mod storage;

pub use storage::{
    CommitInfo, DiffResult, ErrorKind, GitSignature, MergeStrategy, StorageError, StorageResult, StoreConfig,
    WorkspaceStore,
};
