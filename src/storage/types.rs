//! core type-safe wrappers around git primitives for the storage layer.

use std::fmt;
use std::fmt::Formatter;
use std::path::PathBuf;

use git2::Oid;
use serde::{Deserialize, Serialize, Serializer};

/// This makes sure we don't accidentally pass a blob ID where a commit ID
/// is expected. The inner Oid is only accessible within the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitId(pub(crate) Oid);

impl CommitId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    /// raw Oid (for internal use only)
    pub(crate) fn raw(&self) -> Oid {
        self.0
    }

    /// parse a full 40 character hex hash
    ///
    /// abbreviated hashes are rejected: git2 would zero-pad them into a
    /// different object id.
    pub fn parse(hex: &str) -> Option<Self> {
        if hex.len() != 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Oid::from_str(hex).ok().map(CommitId)
    }

    /// short form of the commit ID
    pub fn short(&self) -> String {
        self.0.to_string()[..7].to_string()
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for CommitId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Git blob identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId(pub(crate) Oid);

impl BlobId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated workspace slug.
///
/// Slugs are assigned by the caller, but they become directory names, so
/// they are checked again here to keep every repository inside the root.
///
/// Valid slugs:
/// - 1-100 characters
/// - ASCII alphanumerics, `.`, `_` and `-`
/// - must not start with `.`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Slug(String);

impl Slug {
    const MAX_LEN: usize = 100;

    /// create a new Slug, validating the input
    pub fn new(slug: impl Into<String>) -> Result<Self, InvalidNameError> {
        let slug = slug.into();
        Self::validate(&slug)?;
        Ok(Self(slug))
    }

    fn validate(slug: &str) -> Result<(), InvalidNameError> {
        if slug.is_empty() {
            return Err(InvalidNameError::Empty);
        }

        if slug.len() > Self::MAX_LEN {
            return Err(InvalidNameError::TooLong(slug.len()));
        }

        if slug.starts_with('.') {
            return Err(InvalidNameError::InvalidStart('.'));
        }

        for (i, c) in slug.chars().enumerate() {
            if !c.is_ascii_alphanumeric() && c != '_' && c != '-' && c != '.' {
                return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
            }
        }

        Ok(())
    }

    /// get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A validated path to a file inside a workspace.
///
/// Always relative and `/`-separated, the same form git stores in trees.
/// `..`, `.`, empty components and the `.git` directory are refused so a
/// path can never escape the working tree or reach the object store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FilePath(String);

impl FilePath {
    const MAX_LEN: usize = 4096;

    pub fn new(path: impl Into<String>) -> Result<Self, InvalidNameError> {
        let path = path.into();
        Self::validate(&path)?;
        Ok(Self(path))
    }

    fn validate(path: &str) -> Result<(), InvalidNameError> {
        if path.is_empty() {
            return Err(InvalidNameError::Empty);
        }

        if path.len() > Self::MAX_LEN {
            return Err(InvalidNameError::TooLong(path.len()));
        }

        if path.contains('\\') || path.contains('\0') {
            return Err(InvalidNameError::InvalidPath(path.to_string()));
        }

        for component in path.split('/') {
            match component {
                "" | "." | ".." => return Err(InvalidNameError::InvalidPath(path.to_string())),
                c if c.eq_ignore_ascii_case(".git") => {
                    return Err(InvalidNameError::Reserved(path.to_string()))
                }
                _ => {}
            }
        }

        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// convert to a PathBuf for filesystem operations (relative to the work dir)
    pub fn to_path_buf(&self) -> PathBuf {
        self.0.split('/').collect()
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for FilePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// a branch name, validated against git's ref naming rules
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchName(pub(crate) String);

impl BranchName {
    /// create a new BranchName
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(InvalidNameError::Empty);
        }
        // "HEAD" passes the refname check but would shadow the symbolic ref
        if name == "HEAD" || name.starts_with('-') {
            return Err(InvalidNameError::Reserved(name));
        }
        let full = format!("refs/heads/{}", name);
        match git2::Reference::normalize_name(&full, git2::ReferenceFormat::NORMAL) {
            Ok(normalized) if normalized == full => Ok(Self(name)),
            _ => Err(InvalidNameError::InvalidRef(name)),
        }
    }

    /// get the full ref path (e.g., "refs/heads/main")
    pub fn as_ref_path(&self) -> String {
        format!("refs/heads/{}", self.0)
    }

    /// get the short name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for BranchName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// git signature (author/committer info)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSignature {
    pub name: String,
    pub email: String,
}

impl GitSignature {
    /// create a new signature
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// identity used for commits the engine makes on its own (the seed commit)
    pub fn system() -> Self {
        Self::new("gitspace", "system@gitspace.local")
    }

    /// convert to git2::Signature
    pub(crate) fn to_git2_signature(&self) -> Result<git2::Signature<'static>, git2::Error> {
        git2::Signature::now(&self.name, &self.email)
    }
}

impl Default for GitSignature {
    fn default() -> Self {
        Self::system()
    }
}

/// error type for invalid names (slugs, paths, branches)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidNameError {
    Empty,
    TooLong(usize),
    InvalidStart(char),
    InvalidCharacter { char: char, position: usize },
    Reserved(String),
    InvalidPath(String),
    InvalidRef(String),
}

impl fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name cannot be empty"),
            Self::TooLong(len) => write!(f, "name too long: {} characters", len),
            Self::InvalidStart(c) => write!(f, "name cannot start with '{}'", c),
            Self::InvalidCharacter { char, position } => {
                write!(f, "invalid character '{}' at position {}", char, position)
            }
            Self::Reserved(name) => write!(f, "'{}' is a reserved name", name),
            Self::InvalidPath(path) => write!(f, "invalid path: '{}'", path),
            Self::InvalidRef(name) => write!(f, "invalid ref name: '{}'", name),
        }
    }
}

impl std::error::Error for InvalidNameError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_valid() {
        assert!(Slug::new("my-workspace").is_ok());
        assert!(Slug::new("agent_42.notes").is_ok());
        assert!(Slug::new("A").is_ok());
    }

    #[test]
    fn test_slug_invalid() {
        assert!(Slug::new("").is_err());
        assert!(Slug::new(".hidden").is_err());
        assert!(Slug::new("..").is_err());
        assert!(Slug::new("a/b").is_err());
        assert!(Slug::new("a b").is_err());
        assert!(Slug::new("a".repeat(101)).is_err());
    }

    #[test]
    fn test_file_path_valid() {
        assert!(FilePath::new("a.txt").is_ok());
        assert!(FilePath::new("src/lib/mod.rs").is_ok());
        assert!(FilePath::new(".gitignore").is_ok());
        assert_eq!(
            FilePath::new("docs/readme.md").unwrap().to_path_buf(),
            PathBuf::from("docs").join("readme.md")
        );
    }

    #[test]
    fn test_file_path_rejects_escapes() {
        assert!(FilePath::new("").is_err());
        assert!(FilePath::new("/etc/passwd").is_err());
        assert!(FilePath::new("../outside").is_err());
        assert!(FilePath::new("a/../../b").is_err());
        assert!(FilePath::new("a//b").is_err());
        assert!(FilePath::new("trailing/").is_err());
        assert!(FilePath::new(".git/config").is_err());
        assert!(FilePath::new("nested/.GIT/HEAD").is_err());
        assert!(FilePath::new("win\\path").is_err());
    }

    #[test]
    fn test_branch_name_rules() {
        assert!(BranchName::new("feature").is_ok());
        assert!(BranchName::new("feature/login").is_ok());
        assert!(BranchName::new("").is_err());
        assert!(BranchName::new("a..b").is_err());
        assert!(BranchName::new("has space").is_err());
        assert!(BranchName::new("ends.lock").is_err());
        assert!(BranchName::new("HEAD").is_err());
        assert_eq!(BranchName::new("main").unwrap().as_ref_path(), "refs/heads/main");
    }

    #[test]
    fn test_commit_id_parse() {
        let full = "0123456789abcdef0123456789abcdef01234567";
        let id = CommitId::parse(full).unwrap();
        assert_eq!(id.to_string(), full);
        assert_eq!(id.short(), "0123456");
        assert!(CommitId::parse("0123456").is_none());
        assert!(CommitId::parse(&"z".repeat(40)).is_none());
    }
}
