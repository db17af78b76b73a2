//! Local filesystem backend.
//!
//! Maps a virtual tree onto a real directory, with path security to prevent
//! escaping the root through symlinks.

use std::fs;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::backend::{Backend, HookResult};
use crate::error::VfsError;
use crate::path::VfsPath;
use crate::types::FileType;

/// Local filesystem backend.
///
/// All paths are relative to `root`. For example, if `root` is
/// `/home/amy/project`, then `/src/main.rs` maps to
/// `/home/amy/project/src/main.rs`.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
    read_only: bool,
}

impl LocalBackend {
    /// Create a backend rooted at the given directory.
    ///
    /// The root is canonicalized at construction time to handle symlinks
    /// (e.g. macOS `/tmp` → `/private/tmp`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = dunce::canonicalize(&root).unwrap_or(root);
        Self {
            root,
            read_only: false,
        }
    }

    /// Create a read-only backend.
    pub fn read_only(root: impl Into<PathBuf>) -> Self {
        Self {
            read_only: true,
            ..Self::new(root)
        }
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Real path for a virtual path, without following a final symlink.
    ///
    /// Virtual paths never contain `..`, so only symlinks can lead outside
    /// the root. The parent directory is canonicalized and checked; the last
    /// component is joined as is, so hooks act on a link and not its target.
    pub fn real_path(&self, path: &VfsPath) -> HookResult<PathBuf> {
        let Some(parent) = path.parent() else {
            return Ok(self.root.clone());
        };

        let dir = self.join(&parent);
        if fs::symlink_metadata(&dir).is_err() {
            return Ok(dir.join(path.base_name()));
        }

        // Use dunce for clean canonical paths (no \\?\ on Windows)
        let canonical = dunce::canonicalize(&dir)?;
        self.check_inside(path, &canonical)?;
        Ok(canonical.join(path.base_name()))
    }

    /// Real path with a final symlink followed, for content access.
    ///
    /// The link target must also lie under the root.
    fn target_path(&self, path: &VfsPath) -> HookResult<PathBuf> {
        let full = self.real_path(path)?;
        match fs::symlink_metadata(&full) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let canonical = dunce::canonicalize(&full)?;
                self.check_inside(path, &canonical)?;
                Ok(canonical)
            }
            _ => Ok(full),
        }
    }

    fn join(&self, path: &VfsPath) -> PathBuf {
        path.as_str()
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |acc, segment| acc.join(segment))
    }

    fn check_inside(&self, path: &VfsPath, real: &Path) -> HookResult<()> {
        if real.starts_with(&self.root) {
            Ok(())
        } else {
            Err(VfsError::invalid_path(path.as_str(), "escapes the backend root").into())
        }
    }
}

impl Backend for LocalBackend {
    fn is_read_only(&self, _path: &VfsPath) -> bool {
        self.read_only
    }

    /// Symlinks are reported as files, so traversals never descend into
    /// linked directories.
    fn file_type(&self, path: &VfsPath) -> HookResult<Option<FileType>> {
        let full = self.real_path(path)?;
        match fs::symlink_metadata(&full) {
            Ok(meta) if meta.is_dir() => Ok(Some(FileType::Folder)),
            Ok(_) => Ok(Some(FileType::File)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_children(&self, path: &VfsPath) -> HookResult<Vec<String>> {
        let full = self.real_path(path)?;
        let mut names = Vec::new();
        for entry in fs::read_dir(&full)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }

        names.sort();
        Ok(names)
    }

    fn delete(&self, path: &VfsPath) -> HookResult<()> {
        let full = self.real_path(path)?;
        // a link is removed itself, never its target
        if fs::symlink_metadata(&full)?.is_dir() {
            fs::remove_dir(&full)?;
        } else {
            fs::remove_file(&full)?;
        }
        Ok(())
    }

    fn create_folder(&self, path: &VfsPath) -> HookResult<()> {
        fs::create_dir(self.real_path(path)?)?;
        Ok(())
    }

    fn content_size(&self, path: &VfsPath) -> HookResult<u64> {
        Ok(fs::metadata(self.target_path(path)?)?.len())
    }

    fn open_input(&self, path: &VfsPath) -> HookResult<Box<dyn Read + Send>> {
        let file = fs::File::open(self.target_path(path)?)?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn open_output(&self, path: &VfsPath) -> HookResult<Box<dyn Write + Send>> {
        let file = fs::File::create(self.target_path(path)?)?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn last_modified(&self, path: &VfsPath) -> HookResult<SystemTime> {
        Ok(fs::metadata(self.target_path(path)?)?.modified()?)
    }

    fn set_last_modified(&self, path: &VfsPath, time: SystemTime) -> HookResult<()> {
        let full = self.target_path(path)?;
        let file = if full.is_dir() {
            fs::File::open(&full)?
        } else {
            fs::File::options().write(true).open(&full)?
        };
        file.set_modified(time)?;
        Ok(())
    }
}
