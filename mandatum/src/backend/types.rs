use crate::error::{VfsError, VfsResult};

use bitflags::bitflags;
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

/// A parsed `scheme://path` location understood by a [`Backend`](super::Backend).
///
/// Paths are normalized: repeated separators collapse, a trailing separator
/// is dropped and an empty path becomes `/`. Text without a scheme is
/// accepted when it is an absolute path and is given the `file` scheme.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uri {
    scheme: String,
    path: String,
}

impl Uri {
    /// Builds a URI from an already split scheme and path.
    pub fn new(scheme: impl Into<String>, path: &str) -> Self {
        Self {
            scheme: scheme.into(),
            path: normalize_path(path),
        }
    }

    /// Parses a textual URI.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::InvalidUri`] for an empty string, a malformed
    /// scheme, or a relative path without a scheme.
    pub fn parse(text: &str) -> VfsResult<Self> {
        let text = text.trim();

        if let Some((scheme, path)) = text.split_once("://") {
            let valid = !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));

            if !valid {
                return Err(VfsError::InvalidUri(text.to_string()));
            }

            return Ok(Self::new(scheme.to_ascii_lowercase(), path));
        }

        if text.starts_with('/') {
            return Ok(Self::new("file", text));
        }

        Err(VfsError::InvalidUri(text.to_string()))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the last path component, or `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        if self.path == "/" {
            return None;
        }

        self.path.rsplit('/').next()
    }

    /// Returns the URI of the containing directory, or `None` for the root.
    pub fn parent(&self) -> Option<Uri> {
        if self.path == "/" {
            return None;
        }

        let cut = self.path.rfind('/').unwrap_or(0);
        let parent = if cut == 0 { "/" } else { &self.path[..cut] };

        Some(Uri::new(self.scheme.clone(), parent))
    }

    /// Returns a new URI with `name` appended as a child component.
    pub fn append_file_name(&self, name: &str) -> Uri {
        let path = if self.path == "/" {
            format!("/{name}")
        } else {
            format!("{}/{name}", self.path)
        };

        Uri::new(self.scheme.clone(), &path)
    }

    /// Returns `true` if `self` equals `other` or lies below it.
    pub fn is_within(&self, other: &Uri) -> bool {
        if self.scheme != other.scheme {
            return false;
        }

        if other.path == "/" || self.path == other.path {
            return true;
        }

        self.path
            .strip_prefix(&other.path)
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

fn normalize_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();

    format!("/{}", parts.join("/"))
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.path)
    }
}

impl FromStr for Uri {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uri::parse(s)
    }
}

bitflags! {
    /// Access mode requested when opening or creating a file.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct OpenMode: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const RANDOM = 1 << 2;
        const TRUNCATE = 1 << 3;
    }
}

bitflags! {
    /// Fields of a [`FileInfo`] that `set_file_info` should apply.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct SetFileInfoMask: u32 {
        const NAME = 1 << 0;
        const PERMISSIONS = 1 << 1;
        const OWNER = 1 << 2;
        const TIME = 1 << 3;
    }
}

/// Kind of filesystem object described by a [`FileInfo`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FileType {
    #[default]
    Unknown,
    Regular,
    Directory,
    SymbolicLink,
}

/// Metadata about a single filesystem object.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub file_type: FileType,
    pub size: u64,
    pub permissions: u32,
    pub uid: u32,
    pub gid: u32,
    pub modified: Option<SystemTime>,
    pub symlink_target: Option<String>,
    pub mime_type: Option<String>,
}

impl FileInfo {
    /// Creates an info record with only the name filled in.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }
}

/// Options controlling how file information is gathered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileInfoOptions {
    /// Report the link target's metadata instead of the link itself.
    pub follow_links: bool,

    /// Fill in [`FileInfo::mime_type`].
    pub get_mime_type: bool,
}

/// Well-known directories resolvable through `find_directory`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FindDirectoryKind {
    Desktop,
    Trash,
}

/// One entry of a `get_file_info` answer.
///
/// Entries are associated with their request by `uri`, not by position.
#[derive(Debug)]
pub struct FileInfoResult {
    pub uri: Uri,
    pub result: VfsResult<FileInfo>,
}

/// One entry of a `find_directory` answer, keyed by the URI it was resolved near.
#[derive(Debug)]
pub struct FindDirectoryResult {
    pub near: Uri,
    pub result: VfsResult<Uri>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_path() {
        let uri = Uri::parse("MEM:///a//b/").unwrap();

        assert_eq!(uri.scheme(), "mem");
        assert_eq!(uri.path(), "/a/b");
        assert_eq!(uri.to_string(), "mem:///a/b");
    }

    #[test]
    fn bare_absolute_path_is_a_file_uri() {
        assert_eq!(Uri::parse("/tmp/x").unwrap(), Uri::new("file", "/tmp/x"));
        assert!(Uri::parse("relative/x").is_err());
        assert!(Uri::parse("bad scheme://x").is_err());
    }

    #[test]
    fn parent_and_children() {
        let uri = Uri::new("mem", "/docs/a.txt");

        assert_eq!(uri.file_name(), Some("a.txt"));
        assert_eq!(uri.parent(), Some(Uri::new("mem", "/docs")));
        assert_eq!(Uri::new("mem", "/docs").parent(), Some(Uri::new("mem", "/")));
        assert_eq!(Uri::new("mem", "/").parent(), None);
        assert_eq!(Uri::new("mem", "/").append_file_name("x"), Uri::new("mem", "/x"));
    }

    #[test]
    fn within() {
        let docs = Uri::new("mem", "/docs");

        assert!(Uri::new("mem", "/docs/a").is_within(&docs));
        assert!(docs.is_within(&docs));
        assert!(!Uri::new("mem", "/docsx").is_within(&docs));
        assert!(!Uri::new("file", "/docs/a").is_within(&docs));
    }
}
