//! Repository creation and duplication.
//!
//! A new workspace is a working-copy repository holding one seed commit
//! (a README naming the workspace) on the default branch. A fork is a full
//! recursive copy of another workspace's directory, metadata included, so
//! the two share nothing afterwards.
//!
//! Both operations either leave a complete repository at the slug's path or
//! leave the path untouched.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::storage::commit::{CommitBuilder, CommitMessage};
use crate::storage::config::StoreConfig;
use crate::storage::error::{BackendError, StorageError, StorageResult};
use crate::storage::locator::RepositoryLocator;
use crate::storage::repository::GitRepository;
use crate::storage::types::{CommitId, Slug};

const README: &str = "README.md";

/// Initialize the repository for `slug` with its seed commit.
pub fn create_repository(locator: &RepositoryLocator, slug: &Slug, config: &StoreConfig) -> StorageResult<PathBuf> {
    let path = locator.path_for(slug);
    if locator.is_occupied(slug) {
        return Err(StorageError::AlreadyExists {
            slug: slug.to_string(),
            path,
        });
    }

    let init_error = |source: BackendError| StorageError::Init {
        slug: slug.to_string(),
        source,
    };

    let seeded = GitRepository::init(slug, &path, &config.default_branch)
        .map_err(|e| init_error(e.into()))
        .and_then(|repo| seed(&repo, config));

    match seeded {
        Ok(commit) => {
            info!(slug = %slug, commit = %commit, path = %path.display(), "created workspace");
            Ok(path)
        }
        Err(e) => {
            discard(&path);
            Err(match e {
                StorageError::Commit { source, .. } | StorageError::Backend { source, .. } => init_error(source),
                other => other,
            })
        }
    }
}

/// Write the README and record the first commit.
fn seed(repo: &GitRepository, config: &StoreConfig) -> StorageResult<CommitId> {
    let content = CommitMessage::readme(repo.slug());
    fs::write(repo.workdir().join(README), content).map_err(|e| repo.fail(e))?;

    let mut index = repo.raw().index().map_err(|e| repo.fail(e))?;
    index.add_path(Path::new(README)).map_err(|e| repo.fail(e))?;
    index.write().map_err(|e| repo.fail(e))?;
    let tree = index.write_tree().map_err(|e| repo.fail(e))?;

    CommitBuilder::new(repo)
        .tree(tree)
        .message(CommitMessage::INITIAL)
        .signature(config.system_signature.clone())
        .update_ref("HEAD")
        .commit()
}

/// Copy the repository for `from` into a new repository for `to`.
///
/// The copy is assembled in a hidden staging directory and renamed into
/// place, so `to` never exists half-copied.
pub fn duplicate_repository(locator: &RepositoryLocator, from: &Slug, to: &Slug) -> StorageResult<PathBuf> {
    let source = locator.path_for(from);
    let target = locator.path_for(to);

    if !source.is_dir() {
        return Err(StorageError::CloneSourceMissing { from: from.to_string() });
    }
    if from == to || locator.is_occupied(to) {
        return Err(StorageError::CloneTargetExists { to: to.to_string() });
    }

    let staging = locator.staging_path_for(to);
    debug!(from = %from, to = %to, staging = %staging.display(), "copying workspace");

    let copied = copy_tree(&source, &staging).and_then(|()| Ok(fs::rename(&staging, &target)?));

    match copied {
        Ok(()) => {
            info!(from = %from, to = %to, path = %target.display(), "forked workspace");
            Ok(target)
        }
        Err(source_err) => {
            discard(&staging);
            Err(StorageError::Clone {
                from: from.to_string(),
                to: to.to_string(),
                source: source_err,
            })
        }
    }
}

/// Recursively copy `src` to `dst`, which must not exist yet.
fn copy_tree(src: &Path, dst: &Path) -> Result<(), BackendError> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src).map_err(io::Error::other)?;
        let dest = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&dest)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &dest)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &dest)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    let target = fs::read_link(src)?;
    std::os::unix::fs::symlink(target, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, _dst: &Path) -> io::Result<()> {
    warn!(path = %src.display(), "skipping symlink while copying workspace");
    Ok(())
}

/// Best-effort removal of a partially built directory.
fn discard(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to clean up partial workspace");
        }
    }
}
