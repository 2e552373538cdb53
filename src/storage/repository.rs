//! Handle to one workspace repository.
//!
//! `git2::Repository` is not `Sync`, so a handle is opened per call while the
//! caller holds the workspace lock, and dropped when the call returns. Every
//! other storage module takes a `&GitRepository` so its errors can name the
//! workspace they came from.

use std::path::{Path, PathBuf};

use git2::{Repository, RepositoryInitOptions};

use crate::storage::error::{BackendError, StorageError, StorageResult};
use crate::storage::types::{BranchName, Slug};

pub struct GitRepository {
    slug: Slug,
    path: PathBuf,
    repo: Repository,
}

impl GitRepository {
    /// Open an existing repository.
    pub(crate) fn open(slug: &Slug, path: &Path) -> StorageResult<Self> {
        let not_found = || StorageError::RepositoryNotFound {
            slug: slug.to_string(),
        };

        if !path.is_dir() {
            return Err(not_found());
        }

        let repo = Repository::open(path).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                not_found()
            } else {
                StorageError::backend(slug.as_str(), e)
            }
        })?;

        Ok(Self {
            slug: slug.clone(),
            path: path.to_path_buf(),
            repo,
        })
    }

    /// Initialize an empty working-copy repository whose unborn HEAD points
    /// at `default_branch`.
    pub(crate) fn init(slug: &Slug, path: &Path, default_branch: &BranchName) -> Result<Self, git2::Error> {
        let mut opts = RepositoryInitOptions::new();
        opts.no_reinit(true)
            .mkpath(true)
            .initial_head(default_branch.as_str());

        let repo = Repository::init_opts(path, &opts)?;

        Ok(Self {
            slug: slug.clone(),
            path: path.to_path_buf(),
            repo,
        })
    }

    pub fn slug(&self) -> &str {
        self.slug.as_str()
    }

    /// Root of the working tree (the repository directory itself).
    pub fn workdir(&self) -> &Path {
        self.repo.workdir().unwrap_or(&self.path)
    }

    pub(crate) fn raw(&self) -> &Repository {
        &self.repo
    }

    /// Wrap a read-path failure with this workspace's slug.
    pub(crate) fn fail(&self, source: impl Into<BackendError>) -> StorageError {
        StorageError::backend(self.slug(), source)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let slug = Slug::new("ghost").unwrap();
        let err = GitRepository::open(&slug, &dir.path().join("ghost.git")).err().unwrap();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_open_plain_directory_is_not_found() {
        let dir = TempDir::new().unwrap();
        let slug = Slug::new("plain").unwrap();
        let path = dir.path().join("plain.git");
        std::fs::create_dir(&path).unwrap();
        let err = GitRepository::open(&slug, &path).err().unwrap();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_init_sets_unborn_head() {
        let dir = TempDir::new().unwrap();
        let slug = Slug::new("fresh").unwrap();
        let path = dir.path().join("fresh.git");
        let repo = GitRepository::init(&slug, &path, &BranchName::new("trunk").unwrap()).unwrap();

        assert_eq!(repo.slug(), "fresh");
        let head = repo.raw().find_reference("HEAD").unwrap();
        assert_eq!(head.symbolic_target(), Some("refs/heads/trunk"));

        // reinitializing over an existing repository is refused
        assert!(GitRepository::init(&slug, &path, &BranchName::new("trunk").unwrap()).is_err());
    }
}
