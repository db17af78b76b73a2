//! File nodes.
//!
//! A [`FileNode`] is one entry in a [`FileSystem`]. It caches what it learns
//! from the backend (its type, its children, its parent) and exposes the
//! tree operations built on top of the [`Backend`] hooks.
//!
//! ## Attachment
//!
//! A node starts detached. The first call that needs backend state attaches
//! it: the backend `attach` hook runs, then `file_type`, and the result is
//! cached. Closing the node or changing its type (create, delete, finishing
//! an output stream) detaches it again, so the next access re-resolves.
//!
//! ## Locking
//!
//! Each node guards its cache with its own mutex. A node never holds its lock
//! while calling into another node.

use std::fmt;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::backend::Backend;
use crate::content::FileContent;
use crate::error::{VfsError, VfsResult};
use crate::fs::FileSystem;
use crate::path::{NameScope, VfsPath};
use crate::selector::{AllSelector, FileSelector, SelectInfo};
use crate::traverse::traverse;
use crate::types::FileType;

/// Cached type state. `Attached(None)` means the file is known not to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Attachment {
    #[default]
    Detached,
    Attached(Option<FileType>),
}

#[derive(Default)]
struct NodeState {
    attachment: Attachment,
    /// `None` until listed; an empty list means "listed, no children".
    children: Option<Vec<Arc<FileNode>>>,
    parent: Option<Weak<FileNode>>,
    content: Option<Arc<FileContent>>,
}

/// One file or folder in a [`FileSystem`].
///
/// Obtain nodes from [`FileSystem::resolve`], [`FileSystem::root`] or from
/// other nodes; there is exactly one node per path per file system.
pub struct FileNode {
    name: VfsPath,
    fs: Weak<FileSystem>,
    backend: Arc<dyn Backend>,
    /// Read-only override from the file system configuration.
    force_read_only: bool,
    state: Mutex<NodeState>,
}

impl FileNode {
    pub(crate) fn new(
        name: VfsPath,
        fs: Weak<FileSystem>,
        backend: Arc<dyn Backend>,
        force_read_only: bool,
    ) -> Self {
        Self {
            name,
            fs,
            backend,
            force_read_only,
            state: Mutex::new(NodeState::default()),
        }
    }

    /// Path of this node.
    pub fn name(&self) -> &VfsPath {
        &self.name
    }

    /// The file system that owns this node.
    pub fn file_system(&self) -> VfsResult<Arc<FileSystem>> {
        self.fs.upgrade().ok_or_else(|| VfsError::FileSystemDropped {
            path: self.name.to_string(),
        })
    }

    /// Returns true if this file may not be modified.
    pub fn is_read_only(&self) -> bool {
        self.force_read_only || self.backend.is_read_only(&self.name)
    }

    /// Returns true if the node currently holds resolved backend state.
    pub fn is_attached(&self) -> bool {
        matches!(self.state.lock().attachment, Attachment::Attached(_))
    }

    // ========================================================================
    // Attachment
    // ========================================================================

    fn attach(&self) -> VfsResult<Option<FileType>> {
        let mut state = self.state.lock();
        self.attach_locked(&mut state)
    }

    fn attach_locked(&self, state: &mut NodeState) -> VfsResult<Option<FileType>> {
        if let Attachment::Attached(kind) = state.attachment {
            return Ok(kind);
        }

        self.backend
            .attach(&self.name)
            .map_err(VfsError::from_hook("attach", &self.name))?;
        let kind = self
            .backend
            .file_type(&self.name)
            .map_err(VfsError::from_hook("determine the type of", &self.name))?;

        state.attachment = Attachment::Attached(kind);
        tracing::debug!(path = %self.name, kind = ?kind, "attached");
        Ok(kind)
    }

    fn detach_locked(&self, state: &mut NodeState) {
        if let Attachment::Attached(_) = state.attachment {
            self.backend.detach(&self.name);
            tracing::trace!(path = %self.name, "detached");
        }
        state.attachment = Attachment::Detached;
        state.children = None;
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Returns true if the file exists.
    pub fn exists(&self) -> VfsResult<bool> {
        Ok(self.attach()?.is_some())
    }

    /// Type of the file. Fails if it does not exist.
    pub fn file_type(&self) -> VfsResult<FileType> {
        self.attach()?
            .ok_or_else(|| VfsError::not_found("get the type of", &self.name))
    }

    /// Parent folder.
    ///
    /// The root has no parent, unless its file system is layered on a node
    /// of another file system, in which case that node's parent is returned.
    pub fn parent(&self) -> VfsResult<Option<Arc<FileNode>>> {
        let Some(parent_name) = self.name.parent() else {
            let fs = self.file_system()?;
            return match fs.parent_layer() {
                Some(layer) => layer.parent(),
                None => Ok(None),
            };
        };

        if let Some(parent) = self.cached_parent() {
            return Ok(Some(parent));
        }

        let parent = self.file_system()?.find_file(&parent_name);
        self.state.lock().parent = Some(Arc::downgrade(&parent));
        Ok(Some(parent))
    }

    fn cached_parent(&self) -> Option<Arc<FileNode>> {
        self.state.lock().parent.as_ref().and_then(Weak::upgrade)
    }

    /// Children of a folder, in backend order.
    pub fn children(&self) -> VfsResult<Vec<Arc<FileNode>>> {
        let mut state = self.state.lock();
        match self.attach_locked(&mut state)? {
            None => return Err(VfsError::not_found("list the children of", &self.name)),
            Some(FileType::File) => {
                return Err(VfsError::not_a_folder("list the children of", &self.name));
            }
            Some(FileType::Folder) => {}
        }

        if let Some(children) = &state.children {
            return Ok(children.clone());
        }

        let names = self
            .backend
            .list_children(&self.name)
            .map_err(VfsError::from_hook("list the children of", &self.name))?;

        let children = if names.is_empty() {
            Vec::new()
        } else {
            let fs = self.file_system()?;
            names
                .iter()
                .map(|name| {
                    let child = self.name.resolve_name(name, NameScope::Child)?;
                    Ok(fs.find_file(&child))
                })
                .collect::<VfsResult<Vec<_>>>()?
        };

        state.children = Some(children.clone());
        Ok(children)
    }

    /// Resolve `name` relative to this node, within `scope`.
    pub fn resolve_file(&self, name: &str, scope: NameScope) -> VfsResult<Arc<FileNode>> {
        let path = self.name.resolve_name(name, scope)?;
        Ok(self.file_system()?.find_file(&path))
    }

    /// Resolve a relative path against this node, or an absolute path
    /// against the root of its file system.
    pub fn resolve_path(&self, path: &str) -> VfsResult<Arc<FileNode>> {
        self.resolve_file(path, NameScope::FileSystem)
    }

    /// Content handle, created on first use.
    pub fn content(self: &Arc<Self>) -> VfsResult<Arc<FileContent>> {
        let mut state = self.state.lock();
        self.attach_locked(&mut state)?;
        let content = state.content.get_or_insert_with(|| {
            Arc::new(FileContent::new(
                Arc::downgrade(self),
                self.name.clone(),
                Arc::clone(&self.backend),
            ))
        });
        Ok(Arc::clone(content))
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Nodes selected by `selector`, starting at this node.
    ///
    /// With `depthwise` set a node comes after all of its descendants
    /// (post-order); otherwise before them (pre-order). Returns an empty list
    /// when this node does not exist.
    pub fn find_files(
        self: &Arc<Self>,
        selector: &dyn FileSelector,
        depthwise: bool,
    ) -> VfsResult<Vec<Arc<FileNode>>> {
        let mut selected = Vec::new();
        if self.exists()? {
            let mut info = SelectInfo::new(Arc::clone(self));
            traverse(&mut info, selector, depthwise, &mut selected)?;
        }
        Ok(selected)
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Create this file as `kind`, creating missing ancestor folders first.
    ///
    /// Does nothing if the file already exists with that type.
    #[tracing::instrument(skip(self), fields(path = %self.name), name = "vfs.create")]
    pub fn create(self: &Arc<Self>, kind: FileType) -> VfsResult<()> {
        match self.attach()? {
            Some(existing) if existing == kind => return Ok(()),
            Some(existing) => {
                return Err(VfsError::TypeMismatch {
                    path: self.name.to_string(),
                    requested: kind,
                    existing,
                });
            }
            None => {}
        }
        if self.is_read_only() {
            return Err(VfsError::read_only("create", &self.name));
        }

        if let Some(parent) = self.parent()? {
            parent.create(FileType::Folder)?;
        }

        match kind {
            FileType::Folder => {
                self.backend
                    .create_folder(&self.name)
                    .map_err(VfsError::from_hook("create", &self.name))?;
                self.handle_type_changed();
                // new folders are empty
                self.state.lock().children = Some(Vec::new());
            }
            FileType::File => {
                // closing the stream runs the type-changed step
                self.output_stream()?.close()?;
            }
        }
        tracing::debug!(path = %self.name, %kind, "created");
        Ok(())
    }

    /// Delete the nodes `selector` picks from this subtree.
    ///
    /// Children are always deleted before their folder. A folder that still
    /// has children when its turn comes (because the selector skipped some,
    /// or deleting one failed earlier) is left in place without error.
    /// Returns the number of files deleted.
    #[tracing::instrument(skip(self, selector), fields(path = %self.name), name = "vfs.delete")]
    pub fn delete(self: &Arc<Self>, selector: &dyn FileSelector) -> VfsResult<usize> {
        if self.attach()?.is_none() {
            return Ok(0);
        }

        let files = self.find_files(selector, true)?;

        let mut deleted = 0;
        for file in &files {
            if file.attach()? == Some(FileType::Folder) && !file.children()?.is_empty() {
                tracing::debug!(path = %file.name, "folder still has children, skipping");
                continue;
            }
            file.delete_self()?;
            deleted += 1;
        }
        Ok(deleted)
    }

    fn delete_self(&self) -> VfsResult<()> {
        if self.is_read_only() {
            return Err(VfsError::read_only("delete", &self.name));
        }

        self.backend
            .delete(&self.name)
            .map_err(VfsError::from_hook("delete", &self.name))?;

        self.handle_type_changed();
        Ok(())
    }

    /// Copy the nodes `selector` picks from `source`'s subtree to the same
    /// relative paths under this node.
    ///
    /// A destination that exists with a different type is deleted first.
    /// Not atomic: on failure, files copied so far stay in place. Returns the
    /// number of files and folders copied.
    #[tracing::instrument(
        skip(self, source, selector),
        fields(src = %source.name, dest = %self.name),
        name = "vfs.copy_from"
    )]
    pub fn copy_from(
        self: &Arc<Self>,
        source: &Arc<FileNode>,
        selector: &dyn FileSelector,
    ) -> VfsResult<usize> {
        if !source.exists()? {
            return Err(VfsError::not_found("copy", &source.name));
        }
        if self.is_read_only() {
            return Err(VfsError::read_only("copy to", &self.name));
        }

        let files = source.find_files(selector, false)?;
        let buffer_size = self.file_system()?.config().copy_buffer_size;

        for src in &files {
            let relative = source.name.relative_name(&src.name);
            let dest = self.resolve_file(&relative, NameScope::DescendantOrSelf)?;
            let src_kind = src.file_type()?;

            if dest.exists()? && dest.file_type()? != src_kind {
                tracing::debug!(path = %dest.name, "destination has a different type, deleting");
                dest.delete(&AllSelector)?;
            }

            match src_kind {
                FileType::File => copy_content(src, &dest, buffer_size)?,
                FileType::Folder => dest.create(FileType::Folder)?,
            }
        }
        Ok(files.len())
    }

    /// Materialize this node and the descendants `selector` picks on local
    /// disk, returning the local path of this node's copy.
    #[tracing::instrument(skip(self, selector), fields(path = %self.name), name = "vfs.replicate")]
    pub fn replicate(self: &Arc<Self>, selector: &dyn FileSelector) -> VfsResult<PathBuf> {
        if !self.exists()? {
            return Err(VfsError::not_found("replicate", &self.name));
        }
        let fs = self.file_system()?;
        fs.replicator().replicate(self, selector)
    }

    /// Open the content for writing, creating missing ancestor folders.
    pub fn output_stream(self: &Arc<Self>) -> VfsResult<crate::ContentWriter> {
        self.content()?.output_stream()
    }

    /// Checks run before an output stream is opened.
    pub(crate) fn prepare_output(&self) -> VfsResult<()> {
        let kind = self.attach()?;
        if self.is_read_only() {
            return Err(VfsError::read_only("write to", &self.name));
        }
        if kind == Some(FileType::Folder) {
            return Err(VfsError::is_a_folder("write to", &self.name));
        }
        if kind.is_none() {
            if let Some(parent) = self.parent()? {
                parent.create(FileType::Folder)?;
            }
        }
        Ok(())
    }

    /// Called when an output stream on this node has been closed.
    pub(crate) fn end_output(&self) {
        self.handle_type_changed();
    }

    /// Close the content handle and detach.
    ///
    /// Open streams are revoked. The node stays usable and re-attaches on
    /// the next access.
    pub fn close(&self) -> VfsResult<()> {
        let content = self.state.lock().content.clone();
        let result = match content {
            Some(content) => content.close(),
            None => Ok(()),
        };

        let mut state = self.state.lock();
        self.detach_locked(&mut state);
        result
    }

    // ========================================================================
    // Invalidation
    // ========================================================================

    /// Drop cached state after this file was created or deleted, and tell
    /// the parent its children changed.
    fn handle_type_changed(&self) {
        if let Some(parent) = self.known_parent() {
            parent.invalidate_children();
        }

        let mut state = self.state.lock();
        self.detach_locked(&mut state);
    }

    /// Parent node if it is cached here or already known to the registry.
    /// Never creates one.
    fn known_parent(&self) -> Option<Arc<FileNode>> {
        if let Some(parent) = self.cached_parent() {
            return Some(parent);
        }
        let fs = self.fs.upgrade()?;
        let parent = fs.cached_file(&self.name.parent()?)?;
        self.state.lock().parent = Some(Arc::downgrade(&parent));
        Some(parent)
    }

    fn invalidate_children(&self) {
        self.state.lock().children = None;
        tracing::trace!(path = %self.name, "children invalidated");
        self.backend.on_children_changed(&self.name);
    }
}

/// Stream `src`'s content into `dest`.
///
/// Both streams are released on every path: closed explicitly on success,
/// released on drop when the copy fails.
fn copy_content(src: &Arc<FileNode>, dest: &Arc<FileNode>, buffer_size: usize) -> VfsResult<()> {
    let reader = src.content()?.input_stream()?;
    let mut writer = dest.output_stream()?;
    let mut reader = BufReader::with_capacity(buffer_size, reader);

    io::copy(&mut reader, &mut writer).map_err(|source| VfsError::Copy {
        src: src.name.to_string(),
        dest: dest.name.to_string(),
        source,
    })?;

    writer.close()?;
    reader.into_inner().close()
}

impl fmt::Display for FileNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.name, f)
    }
}

impl fmt::Debug for FileNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attachment = self.state.try_lock().map(|s| s.attachment);
        f.debug_struct("FileNode")
            .field("name", &self.name)
            .field("attachment", &attachment)
            .finish()
    }
}
