//! Backend capability contract.
//!
//! A storage kind (memory, local disk, archive, remote...) implements
//! [`Backend`]. Only type resolution, listing and content reads are required;
//! everything else has a documented default, usually "unsupported".
//!
//! Paths passed to hooks are always paths within the owning file system. The
//! node core guarantees the preconditions noted on each hook.

use std::io::{Read, Write};
use std::time::SystemTime;

use crate::error::VfsError;
use crate::path::VfsPath;
use crate::types::{AttributeValue, Certificate, FileType};

/// Result type for backend hooks.
///
/// Hooks may fail with any error. Returning a [`VfsError`] passes it through
/// the core unchanged; anything else is wrapped with the operation and path.
pub type HookResult<T> = anyhow::Result<T>;

/// Storage hooks behind a [`crate::FileNode`].
pub trait Backend: Send + Sync {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Called before any other hook for `path`, once per attachment.
    ///
    /// Use for lazy initialisation. Must tolerate being called again after
    /// [`Backend::detach`].
    fn attach(&self, _path: &VfsPath) -> HookResult<()> {
        Ok(())
    }

    /// Called when a node is closed or its type changes.
    fn detach(&self, _path: &VfsPath) {}

    /// Returns true if `path` may not be modified.
    fn is_read_only(&self, _path: &VfsPath) -> bool {
        false
    }

    // ========================================================================
    // Structure
    // ========================================================================

    /// Type of the file, `None` if it does not exist.
    ///
    /// The result is cached by the node, so this can be expensive.
    fn file_type(&self, path: &VfsPath) -> HookResult<Option<FileType>>;

    /// Names of the children of a folder.
    ///
    /// Only called when [`Backend::file_type`] returned a folder. The result
    /// is cached by the node.
    fn list_children(&self, path: &VfsPath) -> HookResult<Vec<String>>;

    /// Delete the file.
    ///
    /// Only called when the file exists, is not read-only, and has no
    /// children.
    fn delete(&self, path: &VfsPath) -> HookResult<()> {
        Err(VfsError::unsupported("delete", path).into())
    }

    /// Create the file as a folder.
    ///
    /// Only called when the file does not exist, is not read-only, and its
    /// parent is a folder (or it is the root).
    fn create_folder(&self, path: &VfsPath) -> HookResult<()> {
        Err(VfsError::unsupported("create folder", path).into())
    }

    /// Called after a child of the folder at `path` was created or deleted.
    fn on_children_changed(&self, _path: &VfsPath) {}

    // ========================================================================
    // Content
    // ========================================================================

    /// Size of the content in bytes. Only called for files.
    fn content_size(&self, path: &VfsPath) -> HookResult<u64>;

    /// Open the content for reading. Only called for files.
    ///
    /// At most one stream (input or output) is open per path at any time.
    fn open_input(&self, path: &VfsPath) -> HookResult<Box<dyn Read + Send>>;

    /// Open the content for writing.
    ///
    /// Only called when the path is not read-only and is either a file, or
    /// does not exist and its parent is a folder. At most one stream is open
    /// per path at any time.
    fn open_output(&self, path: &VfsPath) -> HookResult<Box<dyn Write + Send>> {
        Err(VfsError::unsupported("write", path).into())
    }

    /// Called after an input stream for `path` was closed.
    fn end_input(&self, _path: &VfsPath) -> HookResult<()> {
        Ok(())
    }

    /// Called after an output stream for `path` was closed.
    fn end_output(&self, _path: &VfsPath) -> HookResult<()> {
        Ok(())
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Last modification time.
    fn last_modified(&self, path: &VfsPath) -> HookResult<SystemTime> {
        Err(VfsError::unsupported("get last modified time of", path).into())
    }

    /// Set the last modification time.
    fn set_last_modified(&self, path: &VfsPath, _time: SystemTime) -> HookResult<()> {
        Err(VfsError::unsupported("set last modified time of", path).into())
    }

    /// Named attribute, `None` if not set.
    fn attribute(&self, _path: &VfsPath, _name: &str) -> HookResult<Option<AttributeValue>> {
        Ok(None)
    }

    /// Set a named attribute.
    fn set_attribute(
        &self,
        path: &VfsPath,
        _name: &str,
        _value: AttributeValue,
    ) -> HookResult<()> {
        Err(VfsError::unsupported("set attribute of", path).into())
    }

    /// Certificates that signed the content, `None` if unsigned.
    fn certificates(&self, _path: &VfsPath) -> HookResult<Option<Vec<Certificate>>> {
        Ok(None)
    }
}
