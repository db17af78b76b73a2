//! In-memory backend.
//!
//! Used for scratch trees and testing. All data is ephemeral.

use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use parking_lot::RwLock;

use crate::backend::{Backend, HookResult};
use crate::error::VfsError;
use crate::path::VfsPath;
use crate::types::{AttributeValue, FileType};

#[derive(Debug, Clone)]
struct Meta {
    modified: SystemTime,
    attributes: HashMap<String, AttributeValue>,
}

impl Meta {
    fn now() -> Self {
        Self {
            modified: SystemTime::now(),
            attributes: HashMap::new(),
        }
    }
}

/// Entry in the memory tree.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, meta: Meta },
    Folder { meta: Meta },
}

impl Entry {
    fn file(data: Vec<u8>) -> Self {
        Entry::File {
            data,
            meta: Meta::now(),
        }
    }

    fn folder() -> Self {
        Entry::Folder { meta: Meta::now() }
    }

    fn kind(&self) -> FileType {
        match self {
            Entry::File { .. } => FileType::File,
            Entry::Folder { .. } => FileType::Folder,
        }
    }

    fn meta(&self) -> &Meta {
        match self {
            Entry::File { meta, .. } | Entry::Folder { meta } => meta,
        }
    }

    fn meta_mut(&mut self) -> &mut Meta {
        match self {
            Entry::File { meta, .. } | Entry::Folder { meta } => meta,
        }
    }
}

type Entries = Arc<RwLock<HashMap<VfsPath, Entry>>>;

/// In-memory backend.
///
/// Cloning shares the same tree. All data is lost when the last clone is
/// dropped.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    entries: Entries,
    read_only: Arc<AtomicBool>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty tree. The root folder always exists.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert(VfsPath::root(), Entry::folder());
        Self {
            entries: Arc::new(RwLock::new(entries)),
            read_only: Arc::new(AtomicBool::new(false)),
        }
    }

    fn parse(path: &str) -> Option<VfsPath> {
        match VfsPath::parse(path) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(path, error = %e, "ignoring invalid path");
                None
            }
        }
    }

    /// Insert folders for every missing ancestor of `path`.
    fn ensure_parents(entries: &mut HashMap<VfsPath, Entry>, path: &VfsPath) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if matches!(entries.get(&dir), Some(Entry::Folder { .. })) {
                break;
            }
            entries.insert(dir.clone(), Entry::folder());
            current = dir.parent();
        }
    }

    /// Store a file, creating parent folders as needed.
    ///
    /// Bypasses the node layer; nodes that already cached this path see the
    /// change only after they are closed.
    pub fn insert_file(&self, path: &str, data: &[u8]) {
        let Some(path) = Self::parse(path) else {
            return;
        };
        let mut entries = self.entries.write();
        Self::ensure_parents(&mut entries, &path);
        entries.insert(path, Entry::file(data.to_vec()));
    }

    /// Store a folder, creating parent folders as needed.
    pub fn insert_folder(&self, path: &str) {
        let Some(path) = Self::parse(path) else {
            return;
        };
        let mut entries = self.entries.write();
        Self::ensure_parents(&mut entries, &path);
        entries.insert(path, Entry::folder());
    }

    /// Remove a path and everything below it. Returns false if it was absent.
    pub fn remove(&self, path: &str) -> bool {
        let Some(path) = Self::parse(path) else {
            return false;
        };
        let mut entries = self.entries.write();
        entries.retain(|p, _| !path.is_ancestor_of(p));
        entries.remove(&path).is_some()
    }

    /// Content of a file, `None` for folders and missing paths.
    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        let path = Self::parse(path)?;
        match self.entries.read().get(&path) {
            Some(Entry::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    /// Report every path as read-only, or stop doing so.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::Relaxed);
    }

    /// Number of entries, including the root.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if only the root exists.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    fn require_parent_folder(
        entries: &HashMap<VfsPath, Entry>,
        op: &'static str,
        path: &VfsPath,
    ) -> HookResult<()> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        match entries.get(&parent) {
            Some(Entry::Folder { .. }) => Ok(()),
            Some(Entry::File { .. }) => Err(VfsError::not_a_folder(op, &parent).into()),
            None => Err(VfsError::not_found(op, &parent).into()),
        }
    }
}

impl Backend for MemoryBackend {
    fn is_read_only(&self, _path: &VfsPath) -> bool {
        self.read_only.load(Ordering::Relaxed)
    }

    fn file_type(&self, path: &VfsPath) -> HookResult<Option<FileType>> {
        Ok(self.entries.read().get(path).map(Entry::kind))
    }

    fn list_children(&self, path: &VfsPath) -> HookResult<Vec<String>> {
        let entries = self.entries.read();
        match entries.get(path) {
            Some(Entry::Folder { .. }) => {}
            Some(Entry::File { .. }) => {
                return Err(VfsError::not_a_folder("list the children of", path).into());
            }
            None => return Err(VfsError::not_found("list the children of", path).into()),
        }

        let mut names: Vec<String> = entries
            .keys()
            .filter(|p| p.parent().as_ref() == Some(path))
            .map(|p| p.base_name().to_string())
            .collect();

        // Sort for consistent ordering
        names.sort();
        Ok(names)
    }

    fn delete(&self, path: &VfsPath) -> HookResult<()> {
        let mut entries = self.entries.write();
        match entries.get(path) {
            None => return Err(VfsError::not_found("delete", path).into()),
            Some(Entry::Folder { .. }) if entries.keys().any(|p| path.is_ancestor_of(p)) => {
                anyhow::bail!("folder {path} is not empty");
            }
            Some(_) => {}
        }
        entries.remove(path);
        Ok(())
    }

    fn create_folder(&self, path: &VfsPath) -> HookResult<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(path) {
            anyhow::bail!("{path} already exists");
        }
        Self::require_parent_folder(&entries, "create", path)?;
        entries.insert(path.clone(), Entry::folder());
        Ok(())
    }

    fn content_size(&self, path: &VfsPath) -> HookResult<u64> {
        match self.entries.read().get(path) {
            Some(Entry::File { data, .. }) => Ok(data.len() as u64),
            Some(Entry::Folder { .. }) => Err(VfsError::is_a_folder("get the size of", path).into()),
            None => Err(VfsError::not_found("get the size of", path).into()),
        }
    }

    fn open_input(&self, path: &VfsPath) -> HookResult<Box<dyn Read + Send>> {
        match self.entries.read().get(path) {
            Some(Entry::File { data, .. }) => Ok(Box::new(Cursor::new(data.clone()))),
            Some(Entry::Folder { .. }) => Err(VfsError::is_a_folder("read", path).into()),
            None => Err(VfsError::not_found("read", path).into()),
        }
    }

    fn open_output(&self, path: &VfsPath) -> HookResult<Box<dyn Write + Send>> {
        let mut entries = self.entries.write();
        if let Some(Entry::Folder { .. }) = entries.get(path) {
            return Err(VfsError::is_a_folder("write", path).into());
        }
        Self::require_parent_folder(&entries, "write", path)?;

        // truncate, like File::create
        match entries.get_mut(path) {
            Some(Entry::File { data, meta }) => {
                data.clear();
                meta.modified = SystemTime::now();
            }
            _ => {
                entries.insert(path.clone(), Entry::file(Vec::new()));
            }
        }

        Ok(Box::new(MemoryWriter {
            entries: Arc::clone(&self.entries),
            path: path.clone(),
            buffer: Vec::new(),
        }))
    }

    fn last_modified(&self, path: &VfsPath) -> HookResult<SystemTime> {
        match self.entries.read().get(path) {
            Some(entry) => Ok(entry.meta().modified),
            None => Err(VfsError::not_found("get the last modified time of", path).into()),
        }
    }

    fn set_last_modified(&self, path: &VfsPath, time: SystemTime) -> HookResult<()> {
        match self.entries.write().get_mut(path) {
            Some(entry) => {
                entry.meta_mut().modified = time;
                Ok(())
            }
            None => Err(VfsError::not_found("set the last modified time of", path).into()),
        }
    }

    fn attribute(&self, path: &VfsPath, name: &str) -> HookResult<Option<AttributeValue>> {
        Ok(self
            .entries
            .read()
            .get(path)
            .and_then(|entry| entry.meta().attributes.get(name).cloned()))
    }

    fn set_attribute(&self, path: &VfsPath, name: &str, value: AttributeValue) -> HookResult<()> {
        match self.entries.write().get_mut(path) {
            Some(entry) => {
                entry.meta_mut().attributes.insert(name.to_string(), value);
                Ok(())
            }
            None => Err(VfsError::not_found("set an attribute of", path).into()),
        }
    }
}

/// Buffers writes and publishes them to the tree on flush and on drop.
struct MemoryWriter {
    entries: Entries,
    path: VfsPath,
    buffer: Vec<u8>,
}

impl MemoryWriter {
    fn commit(&self) -> io::Result<()> {
        let mut entries = self.entries.write();
        match entries.get_mut(&self.path) {
            Some(Entry::File { data, meta }) => {
                data.clone_from(&self.buffer);
                meta.modified = SystemTime::now();
                Ok(())
            }
            Some(Entry::Folder { .. }) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("{} became a folder while being written", self.path),
            )),
            None => {
                entries.insert(self.path.clone(), Entry::file(self.buffer.clone()));
                Ok(())
            }
        }
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.commit()
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        if let Err(e) = self.commit() {
            tracing::warn!(path = %self.path, error = %e, "failed to commit memory write");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> VfsPath {
        VfsPath::parse(s).unwrap()
    }

    #[test]
    fn test_root_always_exists() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.file_type(&VfsPath::root()).unwrap(), Some(FileType::Folder));
        assert!(backend.is_empty());
    }

    #[test]
    fn test_insert_creates_parents() {
        let backend = MemoryBackend::new();
        backend.insert_file("/a/b/c.txt", b"c");

        assert_eq!(backend.file_type(&p("/a")).unwrap(), Some(FileType::Folder));
        assert_eq!(backend.file_type(&p("/a/b")).unwrap(), Some(FileType::Folder));
        assert_eq!(backend.read("/a/b/c.txt").unwrap(), b"c");
        assert_eq!(backend.len(), 4);
    }

    #[test]
    fn test_list_children_sorted() {
        let backend = MemoryBackend::new();
        backend.insert_file("/d/zeta", b"");
        backend.insert_file("/d/alpha", b"");
        backend.insert_file("/d/mid/deep", b"");

        assert_eq!(
            backend.list_children(&p("/d")).unwrap(),
            vec!["alpha", "mid", "zeta"]
        );
    }

    #[test]
    fn test_delete_non_empty_folder_fails() {
        let backend = MemoryBackend::new();
        backend.insert_file("/d/f", b"");

        assert!(backend.delete(&p("/d")).is_err());
        backend.delete(&p("/d/f")).unwrap();
        backend.delete(&p("/d")).unwrap();
        assert_eq!(backend.file_type(&p("/d")).unwrap(), None);
    }

    #[test]
    fn test_create_folder_requires_parent() {
        let backend = MemoryBackend::new();
        let err = backend.create_folder(&p("/missing/child")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<VfsError>(),
            Some(VfsError::NotFound { .. })
        ));

        backend.create_folder(&p("/present")).unwrap();
        assert!(backend.create_folder(&p("/present")).is_err());
    }

    #[test]
    fn test_writer_commits_on_flush_and_drop() {
        let backend = MemoryBackend::new();
        let mut writer = backend.open_output(&p("/w")).unwrap();

        // open creates an empty file
        assert_eq!(backend.read("/w").unwrap(), b"");

        writer.write_all(b"one").unwrap();
        writer.flush().unwrap();
        assert_eq!(backend.read("/w").unwrap(), b"one");

        writer.write_all(b" two").unwrap();
        drop(writer);
        assert_eq!(backend.read("/w").unwrap(), b"one two");
    }

    #[test]
    fn test_open_output_truncates() {
        let backend = MemoryBackend::new();
        backend.insert_file("/t", b"old content");
        let writer = backend.open_output(&p("/t")).unwrap();
        assert_eq!(backend.read("/t").unwrap(), b"");
        drop(writer);
        assert_eq!(backend.content_size(&p("/t")).unwrap(), 0);
    }

    #[test]
    fn test_open_output_rejects_folder_and_file_parent() {
        let backend = MemoryBackend::new();
        backend.insert_file("/file", b"");
        backend.insert_folder("/dir");

        assert!(backend.open_output(&p("/dir")).is_err());
        assert!(backend.open_output(&p("/file/child")).is_err());
    }

    #[test]
    fn test_remove_subtree() {
        let backend = MemoryBackend::new();
        backend.insert_file("/r/a", b"");
        backend.insert_file("/r/b/c", b"");
        backend.insert_file("/rest", b"");

        assert!(backend.remove("/r"));
        assert!(!backend.remove("/r"));
        assert_eq!(backend.list_children(&VfsPath::root()).unwrap(), vec!["rest"]);
    }

    #[test]
    fn test_clones_share_state() {
        let backend = MemoryBackend::new();
        let other = backend.clone();
        other.insert_file("/shared", b"s");
        other.set_read_only(true);

        assert_eq!(backend.read("/shared").unwrap(), b"s");
        assert!(backend.is_read_only(&p("/shared")));
    }
}
