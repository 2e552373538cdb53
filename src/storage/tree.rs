//!  tree snapshot access.
//!
//! a commit's tree is the complete set of files it contains. This module
//! walks trees recursively and reads blobs out of them; it never touches the
//! working tree.

use std::path::Path;

use git2::{FileMode, ObjectType, Tree, TreeWalkMode, TreeWalkResult};
use serde::Serialize;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::repository::GitRepository;
use crate::storage::types::{BlobId, CommitId, FilePath};

/// One file in a tree snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub path: String,
    /// octal git mode, e.g. `100644`
    pub mode: String,
    pub size: u64,
}

/// A blob reachable from a tree, with the mode it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BlobEntry {
    pub path: String,
    pub blob: BlobId,
    pub mode: i32,
}

impl BlobEntry {
    pub(crate) fn is_executable(&self) -> bool {
        self.mode == i32::from(FileMode::BlobExecutable)
    }

    /// regular or executable file, as opposed to a symlink or submodule
    pub(crate) fn is_regular(&self) -> bool {
        self.mode == i32::from(FileMode::Blob) || self.is_executable()
    }
}

/// A read only handle to a git tree at a specific commit
///
/// think of it as a snapshot - it won't change even if new commits are made.
pub struct TreeHandle<'repo> {
    tree: Tree<'repo>,
}

impl<'repo> TreeHandle<'repo> {
    pub(crate) fn new(tree: Tree<'repo>) -> Self {
        Self { tree }
    }

    /// tree of the given commit
    pub(crate) fn at_commit(repo: &'repo GitRepository, commit: CommitId) -> StorageResult<Self> {
        let commit = repo.raw().find_commit(commit.raw()).map_err(|e| repo.fail(e))?;
        let tree = commit.tree().map_err(|e| repo.fail(e))?;
        Ok(Self::new(tree))
    }

    pub(crate) fn inner(&self) -> &Tree<'repo> {
        &self.tree
    }

    /// every blob in the tree, depth first in git's tree order
    pub(crate) fn blobs(&self, repo: &GitRepository) -> StorageResult<Vec<BlobEntry>> {
        let mut entries = Vec::new();
        self.tree
            .walk(TreeWalkMode::PreOrder, |dir, entry| {
                if entry.kind() == Some(ObjectType::Blob) {
                    if let Some(name) = entry.name() {
                        entries.push(BlobEntry {
                            path: format!("{}{}", dir, name),
                            blob: BlobId::new(entry.id()),
                            mode: entry.filemode(),
                        });
                    }
                }
                TreeWalkResult::Ok
            })
            .map_err(|e| repo.fail(e))?;
        Ok(entries)
    }

    /// list files with mode and size, sorted by path
    pub fn list_files(&self, repo: &GitRepository) -> StorageResult<Vec<FileEntry>> {
        let odb = repo.raw().odb().map_err(|e| repo.fail(e))?;

        let mut files = self
            .blobs(repo)?
            .into_iter()
            .map(|entry| {
                let (size, _) = odb.read_header(entry.blob.raw()).map_err(|e| repo.fail(e))?;
                Ok(FileEntry {
                    path: entry.path,
                    mode: format!("{:06o}", entry.mode),
                    size: size as u64,
                })
            })
            .collect::<StorageResult<Vec<_>>>()?;

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    /// read a file's content from the snapshot
    pub fn read_file(&self, repo: &GitRepository, path: &FilePath) -> StorageResult<Vec<u8>> {
        let not_found = || StorageError::FileNotFound {
            slug: repo.slug().to_string(),
            path: path.to_string(),
        };

        let entry = self
            .tree
            .get_path(Path::new(path.as_str()))
            .map_err(|_| not_found())?;
        if entry.kind() != Some(ObjectType::Blob) {
            return Err(not_found());
        }

        let blob = repo.raw().find_blob(entry.id()).map_err(|e| repo.fail(e))?;
        Ok(blob.content().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::commit::CommitBuilder;
    use crate::storage::repository::test_support::repo_with_readme;

    fn commit_files(repo: &GitRepository, parent: CommitId, files: &[(&str, &str)]) -> CommitId {
        let workdir = repo.workdir().to_path_buf();
        let mut index = repo.raw().index().unwrap();
        for (path, content) in files {
            let full = workdir.join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(&full, content).unwrap();
            index.add_path(Path::new(path)).unwrap();
        }
        index.write().unwrap();
        let tree = index.write_tree().unwrap();
        CommitBuilder::new(repo)
            .tree(tree)
            .parent(parent)
            .message("files")
            .update_ref("HEAD")
            .commit()
            .unwrap()
    }

    #[test]
    fn test_list_files_recurses_and_sorts() {
        let (_dir, repo, base) = repo_with_readme();
        let head = commit_files(&repo, base, &[("src/lib.rs", "fn main() {}\n"), ("a.txt", "hello")]);

        let tree = TreeHandle::at_commit(&repo, head).unwrap();
        let files = tree.list_files(&repo).unwrap();

        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["README.md", "a.txt", "src/lib.rs"]);

        let a = files.iter().find(|f| f.path == "a.txt").unwrap();
        assert_eq!(a.size, 5);
        assert_eq!(a.mode, "100644");
    }

    #[test]
    fn test_read_file_from_snapshot() {
        let (_dir, repo, base) = repo_with_readme();
        let head = commit_files(&repo, base, &[("docs/guide.md", "v1")]);

        // the snapshot keeps its content after the working tree changes
        std::fs::write(repo.workdir().join("docs/guide.md"), "v2").unwrap();

        let tree = TreeHandle::at_commit(&repo, head).unwrap();
        let path = FilePath::new("docs/guide.md").unwrap();
        assert_eq!(tree.read_file(&repo, &path).unwrap(), b"v1");

        let dir = FilePath::new("docs").unwrap();
        assert!(tree.read_file(&repo, &dir).unwrap_err().is_not_found());

        let missing = FilePath::new("nope.txt").unwrap();
        assert!(tree.read_file(&repo, &missing).unwrap_err().is_not_found());

        let old = TreeHandle::at_commit(&repo, base).unwrap();
        assert!(old.read_file(&repo, &path).unwrap_err().is_not_found());
    }
}
