//! Local replicas of virtual files.
//!
//! Some consumers need a real path on disk (an external tool, an mmap). A
//! [`Replicator`] copies a node, and the descendants a selector picks, into a
//! local directory and returns where the node landed.

use std::fs;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use crate::error::{VfsError, VfsResult};
use crate::node::FileNode;
use crate::selector::FileSelector;
use crate::types::FileType;

/// Materializes virtual files on local disk.
pub trait Replicator: Send + Sync {
    /// Copy `node` and the descendants `selector` picks to local disk.
    ///
    /// Returns the local path corresponding to `node`.
    fn replicate(&self, node: &Arc<FileNode>, selector: &dyn FileSelector) -> VfsResult<PathBuf>;

    /// Release every replica this replicator created.
    fn close(&self) -> VfsResult<()> {
        Ok(())
    }
}

/// Replicator that writes each replica into a fresh temporary directory.
///
/// Replicas live until [`Replicator::close`] is called or the replicator is
/// dropped.
pub struct TempReplicator {
    /// Parent for replica directories; the system temp dir when `None`.
    base_dir: Option<PathBuf>,
    replicas: Mutex<Vec<TempDir>>,
}

impl TempReplicator {
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        Self {
            base_dir,
            replicas: Mutex::new(Vec::new()),
        }
    }

    /// Number of live replica directories.
    pub fn replica_count(&self) -> usize {
        self.replicas.lock().len()
    }

    fn new_replica_dir(&self) -> io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("kasane-replica-");
        match &self.base_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                builder.tempdir_in(dir)
            }
            None => builder.tempdir(),
        }
    }
}

impl Default for TempReplicator {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Replicator for TempReplicator {
    #[tracing::instrument(skip(self, node, selector), fields(path = %node), name = "vfs.temp_replicate")]
    fn replicate(&self, node: &Arc<FileNode>, selector: &dyn FileSelector) -> VfsResult<PathBuf> {
        let replica = self.new_replica_dir()?;

        let base_name = match node.name().base_name() {
            "" => "root",
            name => name,
        };
        let target = replica.path().join(base_name);

        if node.file_type()? == FileType::Folder {
            fs::create_dir_all(&target)?;
        }

        let files = node.find_files(selector, false)?;
        for file in &files {
            let relative = node.name().relative_name(file.name());
            let local = if relative == "." {
                target.clone()
            } else {
                target.join(&relative)
            };

            match file.file_type()? {
                FileType::Folder => fs::create_dir_all(&local)?,
                FileType::File => write_local(file, &local)?,
            }
        }

        tracing::debug!(files = files.len(), local = %target.display(), "replicated");
        self.replicas.lock().push(replica);
        Ok(target)
    }

    fn close(&self) -> VfsResult<()> {
        let replicas = std::mem::take(&mut *self.replicas.lock());

        let mut first_err = None;
        for replica in replicas {
            let path = replica.path().to_path_buf();
            if let Err(e) = replica.close() {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove replica");
                first_err.get_or_insert(VfsError::Io(e));
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Copy the content of `file` to `local`, creating parent directories.
fn write_local(file: &Arc<FileNode>, local: &Path) -> VfsResult<()> {
    if let Some(parent) = local.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut reader = file.content()?.input_stream()?;
    let mut writer = BufWriter::new(fs::File::create(local)?);
    io::copy(&mut reader, &mut writer).map_err(|source| VfsError::Copy {
        src: file.name().to_string(),
        dest: local.display().to_string(),
        source,
    })?;
    writer.into_inner().map_err(io::IntoInnerError::into_error)?;
    reader.close()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryBackend;
    use crate::fs::FileSystem;
    use crate::selector::{AllSelector, SelfSelector, TypeSelector};
    use crate::VfsConfig;

    fn sample() -> Arc<FileSystem> {
        let backend = MemoryBackend::new();
        backend.insert_file("/proj/readme.md", b"# proj");
        backend.insert_file("/proj/src/main.rs", b"fn main() {}");
        backend.insert_folder("/proj/empty");
        FileSystem::new(backend)
    }

    #[test]
    fn test_replicate_tree() {
        let fs = sample();
        let local = fs.resolve("/proj").unwrap().replicate(&AllSelector).unwrap();

        assert!(local.ends_with("proj"));
        assert_eq!(fs::read(local.join("readme.md")).unwrap(), b"# proj");
        assert_eq!(fs::read(local.join("src/main.rs")).unwrap(), b"fn main() {}");
        assert!(local.join("empty").is_dir());
    }

    #[test]
    fn test_replicate_single_file() {
        let fs = sample();
        let local = fs
            .resolve("/proj/readme.md")
            .unwrap()
            .replicate(&SelfSelector)
            .unwrap();
        assert!(local.ends_with("readme.md"));
        assert_eq!(fs::read_to_string(&local).unwrap(), "# proj");
    }

    #[test]
    fn test_replicate_respects_selector() {
        let fs = sample();
        let local = fs
            .resolve("/proj")
            .unwrap()
            .replicate(&TypeSelector(FileType::File))
            .unwrap();

        assert!(local.join("src/main.rs").is_file());
        assert!(!local.join("empty").exists());
    }

    #[test]
    fn test_close_removes_replicas() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new();
        backend.insert_file("/a.txt", b"a");
        let fs = FileSystem::builder(backend)
            .config(VfsConfig::default().with_replica_dir(dir.path()))
            .build();

        let local = fs.resolve("/a.txt").unwrap().replicate(&AllSelector).unwrap();
        assert!(local.starts_with(dir.path()));
        assert!(local.is_file());

        fs.close().unwrap();
        assert!(!local.exists());
    }

    #[test]
    fn test_replica_count() {
        let replicator = TempReplicator::default();
        let fs = sample();
        let node = fs.resolve("/proj/readme.md").unwrap();

        replicator.replicate(&node, &AllSelector).unwrap();
        replicator.replicate(&node, &AllSelector).unwrap();
        assert_eq!(replicator.replica_count(), 2);

        replicator.close().unwrap();
        assert_eq!(replicator.replica_count(), 0);
    }
}
