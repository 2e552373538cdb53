//! Maps workspace slugs to repository directories under the storage root.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::storage::types::Slug;

/// Owns the base storage directory.
///
/// Every repository lives at `<root>/<slug>.git`, a non-bare working copy.
/// The mapping is a pure function of the slug; repositories are never
/// renamed after creation.
#[derive(Debug, Clone)]
pub struct RepositoryLocator {
    root: PathBuf,
}

impl RepositoryLocator {
    const SUFFIX: &'static str = ".git";

    /// Create the locator, creating the root directory if it is absent.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The base storage directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the repository for a slug, whether or not it exists yet.
    pub fn path_for(&self, slug: &Slug) -> PathBuf {
        self.root.join(format!("{}{}", slug, Self::SUFFIX))
    }

    /// Whether anything occupies the slug's path.
    pub fn is_occupied(&self, slug: &Slug) -> bool {
        self.path_for(slug).symlink_metadata().is_ok()
    }

    /// Scratch directory next to the repositories, used to assemble a
    /// duplicate before it is moved into place.
    ///
    /// Starts with `.` so it can never collide with a slug's path.
    pub(crate) fn staging_path_for(&self, slug: &Slug) -> PathBuf {
        let nonce = ulid::Ulid::new().to_string().to_lowercase();
        self.root.join(format!(".{}{}.{}.tmp", slug, Self::SUFFIX, nonce))
    }
}
