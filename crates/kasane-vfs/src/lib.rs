//! # kasane-vfs
//!
//! Backend-agnostic file nodes for a layered virtual filesystem.
//!
//! A [`FileNode`] is one entry in the tree. It looks the same whether it is
//! backed by memory, local disk, or anything else that implements
//! [`Backend`]. Key components:
//!
//! - [`Backend`] - Narrow hook set a storage kind implements
//! - [`FileSystem`] - Registry that owns one node per path
//! - [`FileNode`] - Cached type/children/parent, create/delete/copy/replicate
//! - [`FileSelector`] - Per-node include/descend policy for traversals
//! - [`FileContent`] - Content handle with a single active stream
//! - [`Replicator`] - Materializes a subtree on local disk
//!
//! ## Design Decisions
//!
//! - **Lazy attach**: a node resolves its type on first real access and caches
//!   it until it is closed or its type changes.
//! - **Registry-owned identity**: nodes refer to each other through the
//!   registry. Parent links are weak, so there is no ownership cycle.
//! - **Normalized hook errors**: hooks return `anyhow::Result`; anything that
//!   is not already a [`VfsError`] is wrapped with the operation and path.

pub mod backend;
pub mod backends;
pub mod config;
pub mod content;
mod error;
pub mod fs;
pub mod node;
pub mod path;
pub mod replicator;
pub mod selector;
#[cfg(test)]
pub(crate) mod testing;
mod traverse;
mod types;

pub use backend::{Backend, HookResult};
pub use backends::{LocalBackend, MemoryBackend};
pub use config::VfsConfig;
pub use content::{ContentReader, ContentWriter, FileContent};
pub use error::{VfsError, VfsResult};
pub use fs::{FileSystem, FileSystemBuilder};
pub use node::FileNode;
pub use path::{NameScope, VfsPath};
pub use replicator::{Replicator, TempReplicator};
pub use selector::{
    AllSelector, ChildrenSelector, DepthSelector, DescendantsSelector, FileSelector, FnSelector,
    SelectInfo, SelfAndChildrenSelector, SelfSelector, TypeSelector,
};
pub use types::{AttributeValue, Certificate, FileType};
