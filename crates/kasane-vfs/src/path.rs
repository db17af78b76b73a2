//! Path identity and scoped name resolution.
//!
//! A [`VfsPath`] is absolute and normalized: it always starts with `/`, has no
//! empty, `.` or `..` segments, and has no trailing slash (except the root).

use std::fmt;

use crate::error::{VfsError, VfsResult};

/// Where a resolved name is allowed to land, relative to the base path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameScope {
    /// An immediate child of the base.
    Child,
    /// Any descendant of the base, excluding the base itself.
    Descendant,
    /// The base itself or any descendant.
    DescendantOrSelf,
    /// Anywhere in the file system.
    FileSystem,
}

/// Absolute, normalized path within one file system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VfsPath(String);

impl VfsPath {
    /// The root path, `/`.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Parse and normalize an absolute path.
    ///
    /// A relative path is taken relative to the root.
    pub fn parse(path: &str) -> VfsResult<Self> {
        Self::root().resolve(path)
    }

    /// The path as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for `/`.
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Last path segment; empty for the root.
    pub fn base_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    /// Number of segments; 0 for the root.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Parent path, `None` for the root.
    pub fn parent(&self) -> Option<VfsPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Append a single, already validated segment.
    fn join_segment(&self, segment: &str) -> VfsPath {
        if self.is_root() {
            Self(format!("/{segment}"))
        } else {
            Self(format!("{}/{segment}", self.0))
        }
    }

    fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Resolve `path` against this path with no scope restriction.
    ///
    /// Absolute paths are resolved from the root.
    pub fn resolve(&self, path: &str) -> VfsResult<VfsPath> {
        self.resolve_name(path, NameScope::FileSystem)
    }

    /// Resolve `path` against this path and check the result is in `scope`.
    pub fn resolve_name(&self, path: &str, scope: NameScope) -> VfsResult<VfsPath> {
        if path.contains('\0') {
            return Err(VfsError::invalid_path(path, "contains a NUL byte"));
        }

        let mut stack: Vec<&str> = if path.starts_with('/') {
            Vec::new()
        } else {
            self.segments().collect()
        };

        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if stack.pop().is_none() {
                        return Err(VfsError::invalid_path(path, "escapes the root"));
                    }
                }
                s => stack.push(s),
            }
        }

        let resolved = if stack.is_empty() {
            Self::root()
        } else {
            Self(format!("/{}", stack.join("/")))
        };

        if !self.is_in_scope(&resolved, scope) {
            let reason = match scope {
                NameScope::Child => "not a child of the base path",
                NameScope::Descendant => "not a descendant of the base path",
                NameScope::DescendantOrSelf => "not within the base path",
                NameScope::FileSystem => unreachable!("file system scope always matches"),
            };
            return Err(VfsError::invalid_path(path, reason));
        }
        Ok(resolved)
    }

    /// Returns true if `other` is within `scope` of this path.
    pub fn is_in_scope(&self, other: &VfsPath, scope: NameScope) -> bool {
        match scope {
            NameScope::FileSystem => true,
            NameScope::DescendantOrSelf => self == other || self.is_ancestor_of(other),
            NameScope::Descendant => self.is_ancestor_of(other),
            NameScope::Child => other.parent().as_ref() == Some(self),
        }
    }

    /// Returns true if `other` lies strictly below this path.
    pub fn is_ancestor_of(&self, other: &VfsPath) -> bool {
        if self.is_root() {
            return !other.is_root();
        }
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'/'
    }

    /// Returns true if this path lies strictly below `other`.
    pub fn is_descendant_of(&self, other: &VfsPath) -> bool {
        other.is_ancestor_of(self)
    }

    /// Path of `other` relative to this path.
    ///
    /// Returns `.` for the same path and uses `..` segments to climb out of
    /// this path when `other` is not a descendant.
    pub fn relative_name(&self, other: &VfsPath) -> String {
        let base: Vec<&str> = self.segments().collect();
        let target: Vec<&str> = other.segments().collect();

        let common = base
            .iter()
            .zip(target.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let mut parts: Vec<&str> = std::iter::repeat_n("..", base.len() - common).collect();
        parts.extend(&target[common..]);

        if parts.is_empty() {
            ".".to_string()
        } else {
            parts.join("/")
        }
    }

    /// Child path for a single name, rejecting names that would leave the
    /// child scope.
    pub fn child(&self, name: &str) -> VfsResult<VfsPath> {
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(VfsError::invalid_path(name, "not a valid child name"));
        }
        Ok(self.join_segment(name))
    }
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VfsPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
