//! File system registry.
//!
//! A [`FileSystem`] owns every [`FileNode`] created for it, one per path.
//! Nodes are created on first reference and reused for the life of the file
//! system, so all callers asking for the same path share cached state.

use std::sync::{Arc, Weak};

use dashmap::DashMap;

use crate::backend::Backend;
use crate::config::VfsConfig;
use crate::error::{VfsError, VfsResult};
use crate::node::FileNode;
use crate::path::VfsPath;
use crate::replicator::{Replicator, TempReplicator};

/// Registry of file nodes over a single backend.
pub struct FileSystem {
    backend: Arc<dyn Backend>,
    /// Canonical node per path.
    nodes: DashMap<VfsPath, Arc<FileNode>>,
    /// Node in the enclosing file system this one is layered on, if any.
    parent_layer: Option<Arc<FileNode>>,
    replicator: Arc<dyn Replicator>,
    config: VfsConfig,
    this: Weak<FileSystem>,
}

impl std::fmt::Debug for FileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystem")
            .field("nodes", &self.nodes.len())
            .field("parent_layer", &self.parent_layer.as_ref().map(|n| n.to_string()))
            .field("config", &self.config)
            .finish()
    }
}

/// Builder for [`FileSystem`].
pub struct FileSystemBuilder {
    backend: Arc<dyn Backend>,
    config: VfsConfig,
    replicator: Option<Arc<dyn Replicator>>,
    parent_layer: Option<Arc<FileNode>>,
}

impl FileSystemBuilder {
    /// Start a builder for an already shared backend.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            config: VfsConfig::default(),
            replicator: None,
            parent_layer: None,
        }
    }

    /// Use this configuration.
    pub fn config(mut self, config: VfsConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this replicator instead of a [`TempReplicator`].
    pub fn replicator(mut self, replicator: Arc<dyn Replicator>) -> Self {
        self.replicator = Some(replicator);
        self
    }

    /// Layer the new file system on `node`, which lives in an enclosing file
    /// system (for example the archive file a file system was opened from).
    pub fn parent_layer(mut self, node: Arc<FileNode>) -> Self {
        self.parent_layer = Some(node);
        self
    }

    /// Build the file system.
    pub fn build(self) -> Arc<FileSystem> {
        let replicator = self
            .replicator
            .unwrap_or_else(|| Arc::new(TempReplicator::new(self.config.replica_dir.clone())));

        Arc::new_cyclic(|this| FileSystem {
            backend: self.backend,
            nodes: DashMap::new(),
            parent_layer: self.parent_layer,
            replicator,
            config: self.config,
            this: this.clone(),
        })
    }
}

impl FileSystem {
    /// Create a file system with default configuration.
    pub fn new(backend: impl Backend + 'static) -> Arc<Self> {
        Self::builder(backend).build()
    }

    /// Start building a file system.
    pub fn builder(backend: impl Backend + 'static) -> FileSystemBuilder {
        FileSystemBuilder::new(Arc::new(backend))
    }

    /// The root node, `/`.
    pub fn root(&self) -> Arc<FileNode> {
        self.find_file(&VfsPath::root())
    }

    /// Node for `name`, created if this is the first reference.
    pub fn find_file(&self, name: &VfsPath) -> Arc<FileNode> {
        if let Some(node) = self.nodes.get(name) {
            return Arc::clone(node.value());
        }

        let node = self.nodes.entry(name.clone()).or_insert_with(|| {
            tracing::trace!(path = %name, "registering node");
            Arc::new(FileNode::new(
                name.clone(),
                self.this.clone(),
                Arc::clone(&self.backend),
                self.config.read_only,
            ))
        });
        Arc::clone(node.value())
    }

    /// Node for `name` only if one was already created. Never creates.
    pub fn cached_file(&self, name: &VfsPath) -> Option<Arc<FileNode>> {
        self.nodes.get(name).map(|node| Arc::clone(node.value()))
    }

    /// Node for an absolute path (relative paths are taken from the root).
    pub fn resolve(&self, path: &str) -> VfsResult<Arc<FileNode>> {
        Ok(self.find_file(&VfsPath::parse(path)?))
    }

    /// Node in the enclosing file system this one is layered on.
    pub fn parent_layer(&self) -> Option<&Arc<FileNode>> {
        self.parent_layer.as_ref()
    }

    /// The backend shared by every node.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Configuration this file system was built with.
    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    /// Replicator used by [`FileNode::replicate`].
    pub fn replicator(&self) -> &Arc<dyn Replicator> {
        &self.replicator
    }

    /// Number of nodes created so far.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Close every node and the replicator.
    ///
    /// All nodes are closed even if some fail; the first error is returned.
    pub fn close(&self) -> VfsResult<()> {
        let nodes: Vec<Arc<FileNode>> = self.nodes.iter().map(|n| Arc::clone(n.value())).collect();

        let mut first_err: Option<VfsError> = None;
        for node in nodes {
            if let Err(e) = node.close() {
                tracing::warn!(path = %node, error = %e, "failed to close node");
                first_err.get_or_insert(e);
            }
        }
        if let Err(e) = self.replicator.close() {
            first_err.get_or_insert(e);
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryBackend;

    #[test]
    fn test_one_node_per_path() {
        let fs = FileSystem::new(MemoryBackend::new());
        let a = fs.resolve("/docs/a.txt").unwrap();
        let b = fs.resolve("docs/./a.txt").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(fs.node_count(), 1);
    }

    #[test]
    fn test_cached_file_never_creates() {
        let fs = FileSystem::new(MemoryBackend::new());
        let path = VfsPath::parse("/nowhere").unwrap();
        assert!(fs.cached_file(&path).is_none());
        assert_eq!(fs.node_count(), 0);

        let node = fs.find_file(&path);
        assert!(Arc::ptr_eq(&node, &fs.cached_file(&path).unwrap()));
    }

    #[test]
    fn test_root() {
        let fs = FileSystem::new(MemoryBackend::new());
        let root = fs.root();
        assert!(root.name().is_root());
        assert!(root.exists().unwrap());
        assert!(fs.parent_layer().is_none());
    }

    #[test]
    fn test_config_read_only_applies_to_nodes() {
        let fs = FileSystem::builder(MemoryBackend::new())
            .config(VfsConfig::default().with_read_only(true))
            .build();
        assert!(fs.resolve("/x").unwrap().is_read_only());
    }

    #[test]
    fn test_close_detaches_every_node() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_file("/a.txt", b"a");
        let fs = FileSystemBuilder::new(backend.clone()).build();
        let node = fs.resolve("/a.txt").unwrap();
        assert!(node.exists().unwrap());

        backend.remove("/a.txt");
        // still cached
        assert!(node.exists().unwrap());

        fs.close().unwrap();
        assert!(!node.exists().unwrap());
    }
}
