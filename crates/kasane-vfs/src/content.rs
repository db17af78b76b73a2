//! File content handles and streams.
//!
//! Each file node has at most one [`FileContent`]. It allows a single open
//! stream at a time: a [`ContentReader`] or a [`ContentWriter`]. Streams
//! release their slot when closed or dropped, and closing the handle itself
//! revokes whatever stream is still open.

use std::io::{self, Read, Write};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::backend::Backend;
use crate::error::{VfsError, VfsResult};
use crate::node::FileNode;
use crate::path::VfsPath;
use crate::types::{AttributeValue, Certificate, FileType};

type SharedReader = Arc<Mutex<Option<Box<dyn Read + Send>>>>;
type SharedWriter = Arc<Mutex<Option<Box<dyn Write + Send>>>>;

/// The stream currently occupying a content handle.
enum OpenStream {
    Input(SharedReader),
    Output(SharedWriter),
}

/// Content and metadata of one file.
pub struct FileContent {
    node: Weak<FileNode>,
    name: VfsPath,
    backend: Arc<dyn Backend>,
    open: Mutex<Option<OpenStream>>,
}

impl FileContent {
    pub(crate) fn new(node: Weak<FileNode>, name: VfsPath, backend: Arc<dyn Backend>) -> Self {
        Self {
            node,
            name,
            backend,
            open: Mutex::new(None),
        }
    }

    /// Path of the file this content belongs to.
    pub fn name(&self) -> &VfsPath {
        &self.name
    }

    /// The file node this content belongs to.
    pub fn file(&self) -> VfsResult<Arc<FileNode>> {
        self.node.upgrade().ok_or_else(|| VfsError::FileSystemDropped {
            path: self.name.to_string(),
        })
    }

    /// Fail unless the file exists and is a file.
    fn require_file(&self, op: &'static str) -> VfsResult<()> {
        let node = self.file()?;
        if !node.exists()? {
            return Err(VfsError::not_found(op, &self.name));
        }
        match node.file_type()? {
            FileType::File => Ok(()),
            FileType::Folder => Err(VfsError::is_a_folder(op, &self.name)),
        }
    }

    fn require_exists(&self, op: &'static str) -> VfsResult<()> {
        if self.file()?.exists()? {
            Ok(())
        } else {
            Err(VfsError::not_found(op, &self.name))
        }
    }

    fn require_writable(&self, op: &'static str) -> VfsResult<()> {
        if self.file()?.is_read_only() {
            Err(VfsError::read_only(op, &self.name))
        } else {
            Ok(())
        }
    }

    /// Returns true while a stream is open.
    pub fn is_open(&self) -> bool {
        self.open.lock().is_some()
    }

    /// Size of the content in bytes.
    pub fn size(&self) -> VfsResult<u64> {
        self.require_file("get the size of")?;
        self.backend
            .content_size(&self.name)
            .map_err(VfsError::from_hook("get the size of", &self.name))
    }

    /// Last modification time.
    pub fn last_modified(&self) -> VfsResult<SystemTime> {
        self.require_exists("get the last modified time of")?;
        self.backend
            .last_modified(&self.name)
            .map_err(VfsError::from_hook("get the last modified time of", &self.name))
    }

    /// Set the last modification time.
    pub fn set_last_modified(&self, time: SystemTime) -> VfsResult<()> {
        self.require_exists("set the last modified time of")?;
        self.require_writable("set the last modified time of")?;
        self.backend
            .set_last_modified(&self.name, time)
            .map_err(VfsError::from_hook("set the last modified time of", &self.name))
    }

    /// Named attribute, `None` if not set.
    pub fn attribute(&self, name: &str) -> VfsResult<Option<AttributeValue>> {
        self.require_exists("get an attribute of")?;
        self.backend
            .attribute(&self.name, name)
            .map_err(VfsError::from_hook("get an attribute of", &self.name))
    }

    /// Set a named attribute.
    pub fn set_attribute(&self, name: &str, value: AttributeValue) -> VfsResult<()> {
        self.require_exists("set an attribute of")?;
        self.require_writable("set an attribute of")?;
        self.backend
            .set_attribute(&self.name, name, value)
            .map_err(VfsError::from_hook("set an attribute of", &self.name))
    }

    /// Certificates that signed the content, `None` if unsigned.
    pub fn certificates(&self) -> VfsResult<Option<Vec<Certificate>>> {
        self.require_file("get the certificates of")?;
        self.backend
            .certificates(&self.name)
            .map_err(VfsError::from_hook("get the certificates of", &self.name))
    }

    /// Open the content for reading.
    ///
    /// Fails with [`VfsError::StreamInUse`] if another stream is open.
    pub fn input_stream(self: &Arc<Self>) -> VfsResult<ContentReader> {
        self.require_file("read")?;

        let mut open = self.open.lock();
        if open.is_some() {
            return Err(VfsError::stream_in_use(&self.name));
        }

        let reader = self
            .backend
            .open_input(&self.name)
            .map_err(VfsError::from_hook("open for reading", &self.name))?;
        let inner: SharedReader = Arc::new(Mutex::new(Some(reader)));
        *open = Some(OpenStream::Input(Arc::clone(&inner)));

        tracing::trace!(path = %self.name, "input stream opened");
        Ok(ContentReader {
            content: Arc::clone(self),
            inner,
        })
    }

    /// Open the content for writing, replacing it.
    ///
    /// Creates the file, and any missing ancestor folders, if it does not
    /// exist. Fails with [`VfsError::StreamInUse`] if another stream is open.
    pub fn output_stream(self: &Arc<Self>) -> VfsResult<ContentWriter> {
        let node = self.file()?;

        let mut open = self.open.lock();
        if open.is_some() {
            return Err(VfsError::stream_in_use(&self.name));
        }

        node.prepare_output()?;
        let writer = self
            .backend
            .open_output(&self.name)
            .map_err(VfsError::from_hook("open for writing", &self.name))?;
        let inner: SharedWriter = Arc::new(Mutex::new(Some(writer)));
        *open = Some(OpenStream::Output(Arc::clone(&inner)));

        tracing::trace!(path = %self.name, "output stream opened");
        Ok(ContentWriter {
            content: Arc::clone(self),
            inner,
        })
    }

    /// Close the open stream, if any.
    ///
    /// The stream object stays valid but every further read or write on it
    /// fails.
    pub fn close(&self) -> VfsResult<()> {
        let open = self.open.lock().take();
        match open {
            None => Ok(()),
            Some(OpenStream::Input(inner)) => {
                let reader = inner.lock().take();
                match reader {
                    Some(reader) => {
                        drop(reader);
                        tracing::debug!(path = %self.name, "revoked input stream");
                        self.finish_input()
                    }
                    None => Ok(()),
                }
            }
            Some(OpenStream::Output(inner)) => {
                let writer = inner.lock().take();
                match writer {
                    Some(writer) => {
                        tracing::debug!(path = %self.name, "revoked output stream");
                        self.finish_output(writer)
                    }
                    None => Ok(()),
                }
            }
        }
    }

    /// Empty the slot if it still holds the caller's stream.
    fn release_slot(&self, is_ours: impl Fn(&OpenStream) -> bool) {
        let mut open = self.open.lock();
        if open.as_ref().is_some_and(is_ours) {
            *open = None;
        }
    }

    fn finish_input(&self) -> VfsResult<()> {
        self.backend
            .end_input(&self.name)
            .map_err(VfsError::from_hook("finish reading", &self.name))
    }

    /// Flush and drop `writer`, then run the end-of-output steps.
    ///
    /// The steps run even if the flush fails; the flush error wins.
    fn finish_output(&self, mut writer: Box<dyn Write + Send>) -> VfsResult<()> {
        let flushed = writer.flush();
        drop(writer);

        if let Ok(node) = self.file() {
            node.end_output();
        }
        let ended = self
            .backend
            .end_output(&self.name)
            .map_err(VfsError::from_hook("finish writing", &self.name));

        flushed?;
        ended
    }
}

impl std::fmt::Debug for FileContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileContent")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .finish()
    }
}

fn stream_closed() -> io::Error {
    io::Error::other("stream closed")
}

/// Reader over a file's content.
///
/// Call [`ContentReader::close`] to see errors from releasing the stream.
/// Dropping it releases the stream too, logging any error.
pub struct ContentReader {
    content: Arc<FileContent>,
    inner: SharedReader,
}

impl ContentReader {
    /// Release the stream.
    pub fn close(self) -> VfsResult<()> {
        self.release()
    }

    fn release(&self) -> VfsResult<()> {
        let Some(reader) = self.inner.lock().take() else {
            return Ok(());
        };
        drop(reader);
        self.content.release_slot(|open| match open {
            OpenStream::Input(inner) => Arc::ptr_eq(inner, &self.inner),
            OpenStream::Output(_) => false,
        });
        self.content.finish_input()
    }
}

impl Read for ContentReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.lock().as_mut() {
            Some(reader) => reader.read(buf),
            None => Err(stream_closed()),
        }
    }
}

impl std::fmt::Debug for ContentReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentReader")
            .field("name", &self.content.name)
            .field("closed", &self.inner.lock().is_none())
            .finish()
    }
}

impl Drop for ContentReader {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(path = %self.content.name, error = %e, "failed to release input stream");
        }
    }
}

/// Writer replacing a file's content.
///
/// The new content is committed when the writer is closed. Closing also
/// refreshes the cached type of the file and its parent's children.
pub struct ContentWriter {
    content: Arc<FileContent>,
    inner: SharedWriter,
}

impl ContentWriter {
    /// Flush and release the stream.
    pub fn close(self) -> VfsResult<()> {
        self.release()
    }

    fn release(&self) -> VfsResult<()> {
        let Some(writer) = self.inner.lock().take() else {
            return Ok(());
        };
        self.content.release_slot(|open| match open {
            OpenStream::Output(inner) => Arc::ptr_eq(inner, &self.inner),
            OpenStream::Input(_) => false,
        });
        self.content.finish_output(writer)
    }
}

impl Write for ContentWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.inner.lock().as_mut() {
            Some(writer) => writer.write(buf),
            None => Err(stream_closed()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.inner.lock().as_mut() {
            Some(writer) => writer.flush(),
            None => Err(stream_closed()),
        }
    }
}

impl std::fmt::Debug for ContentWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentWriter")
            .field("name", &self.content.name)
            .field("closed", &self.inner.lock().is_none())
            .finish()
    }
}

impl Drop for ContentWriter {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(path = %self.content.name, error = %e, "failed to release output stream");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryBackend;
    use crate::fs::FileSystem;
    use crate::testing::{Hook, RecordingBackend, recording_fs};
    use serde_json::json;

    fn fs_with(path: &str, data: &[u8]) -> Arc<FileSystem> {
        let backend = MemoryBackend::new();
        backend.insert_file(path, data);
        FileSystem::new(backend)
    }

    #[test]
    fn test_read_content() {
        let fs = fs_with("/a.txt", b"hello world");
        let content = fs.resolve("/a.txt").unwrap().content().unwrap();

        assert_eq!(content.size().unwrap(), 11);
        let mut reader = content.input_stream().unwrap();
        let mut text = String::new();
        reader.read_to_string(&mut text).unwrap();
        reader.close().unwrap();
        assert_eq!(text, "hello world");
        assert!(!content.is_open());
    }

    #[test]
    fn test_stream_debug_output() {
        let fs = fs_with("/a.txt", b"x");
        let content = fs.resolve("/a.txt").unwrap().content().unwrap();

        let reader = content.input_stream().unwrap();
        let text = format!("{reader:?}");
        assert!(text.contains("ContentReader"));
        assert!(text.contains("/a.txt"));
        assert!(text.contains("closed: false"));
        content.close().unwrap();
        assert!(format!("{reader:?}").contains("closed: true"));
        drop(reader);

        let writer = content.output_stream().unwrap();
        assert!(format!("{writer:?}").contains("ContentWriter"));
        let err = content.output_stream().unwrap_err();
        assert!(matches!(err, VfsError::StreamInUse { .. }));
    }

    #[test]
    fn test_single_active_stream() {
        let fs = fs_with("/a.txt", b"x");
        let content = fs.resolve("/a.txt").unwrap().content().unwrap();

        let reader = content.input_stream().unwrap();
        assert!(matches!(
            content.input_stream(),
            Err(VfsError::StreamInUse { .. })
        ));
        assert!(matches!(
            content.output_stream(),
            Err(VfsError::StreamInUse { .. })
        ));

        drop(reader);
        assert!(!content.is_open());
        content.input_stream().unwrap().close().unwrap();
    }

    #[test]
    fn test_close_revokes_open_stream() {
        let backend = RecordingBackend::new();
        backend.memory().insert_file("/a.txt", b"abc");
        let fs = recording_fs(&backend);
        let content = fs.resolve("/a.txt").unwrap().content().unwrap();

        let mut reader = content.input_stream().unwrap();
        content.close().unwrap();
        assert!(!content.is_open());

        let mut buf = [0u8; 4];
        assert!(reader.read(&mut buf).is_err());
        reader.close().unwrap();
        assert_eq!(backend.count(Hook::EndInput, "/a.txt"), 1);
    }

    #[test]
    fn test_revoked_stream_does_not_release_newer_one() {
        let fs = fs_with("/a.txt", b"abc");
        let content = fs.resolve("/a.txt").unwrap().content().unwrap();

        let stale = content.input_stream().unwrap();
        content.close().unwrap();
        let fresh = content.input_stream().unwrap();

        drop(stale);
        assert!(content.is_open());
        drop(fresh);
        assert!(!content.is_open());
    }

    #[test]
    fn test_write_then_read() {
        let fs = FileSystem::new(MemoryBackend::new());
        let node = fs.resolve("/notes/today.md").unwrap();

        let mut writer = node.output_stream().unwrap();
        writer.write_all(b"# today\n").unwrap();
        writer.close().unwrap();

        assert_eq!(node.file_type().unwrap(), FileType::File);
        let content = node.content().unwrap();
        assert_eq!(content.size().unwrap(), 8);

        let mut data = Vec::new();
        content.input_stream().unwrap().read_to_end(&mut data).unwrap();
        assert_eq!(data, b"# today\n");
    }

    #[test]
    fn test_writer_close_runs_end_output_once() {
        let backend = RecordingBackend::new();
        let fs = recording_fs(&backend);
        let node = fs.resolve("/f.txt").unwrap();

        let mut writer = node.output_stream().unwrap();
        writer.write_all(b"data").unwrap();
        writer.close().unwrap();

        assert_eq!(backend.count(Hook::OpenOutput, "/f.txt"), 1);
        assert_eq!(backend.count(Hook::EndOutput, "/f.txt"), 1);
        assert_eq!(backend.memory().read("/f.txt").unwrap(), b"data");
    }

    #[test]
    fn test_dropped_writer_commits() {
        let fs = FileSystem::new(MemoryBackend::new());
        let node = fs.resolve("/dropped.txt").unwrap();
        {
            let mut writer = node.output_stream().unwrap();
            writer.write_all(b"kept").unwrap();
        }
        assert_eq!(node.content().unwrap().size().unwrap(), 4);
    }

    #[test]
    fn test_folder_content_rejected() {
        let backend = MemoryBackend::new();
        backend.insert_folder("/dir");
        let fs = FileSystem::new(backend);
        let content = fs.resolve("/dir").unwrap().content().unwrap();

        assert!(matches!(content.size(), Err(VfsError::IsAFolder { .. })));
        assert!(matches!(
            content.input_stream(),
            Err(VfsError::IsAFolder { .. })
        ));
    }

    #[test]
    fn test_missing_content() {
        let fs = FileSystem::new(MemoryBackend::new());
        let content = fs.resolve("/ghost").unwrap().content().unwrap();
        assert!(content.size().unwrap_err().is_not_found());
        assert!(content.input_stream().unwrap_err().is_not_found());
    }

    #[test]
    fn test_attributes() {
        let fs = fs_with("/a.txt", b"x");
        let content = fs.resolve("/a.txt").unwrap().content().unwrap();

        assert!(content.attribute("owner").unwrap().is_none());
        content.set_attribute("owner", json!("amy")).unwrap();
        assert_eq!(content.attribute("owner").unwrap(), Some(json!("amy")));
        assert!(content.certificates().unwrap().is_none());
    }

    #[test]
    fn test_last_modified() {
        let fs = fs_with("/a.txt", b"x");
        let content = fs.resolve("/a.txt").unwrap().content().unwrap();

        let when = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000);
        content.set_last_modified(when).unwrap();
        assert_eq!(content.last_modified().unwrap(), when);
    }

    #[test]
    fn test_read_only_metadata() {
        let backend = MemoryBackend::new();
        backend.insert_file("/a.txt", b"x");
        backend.set_read_only(true);
        let fs = FileSystem::new(backend);
        let content = fs.resolve("/a.txt").unwrap().content().unwrap();

        assert!(matches!(
            content.set_attribute("k", json!(1)),
            Err(VfsError::ReadOnly { .. })
        ));
        assert!(matches!(
            content.output_stream(),
            Err(VfsError::ReadOnly { .. })
        ));
    }

    #[test]
    fn test_node_close_revokes_writer() {
        let backend = RecordingBackend::new();
        let fs = recording_fs(&backend);
        let node = fs.resolve("/w.txt").unwrap();

        let mut writer = node.output_stream().unwrap();
        writer.write_all(b"partial").unwrap();
        node.close().unwrap();

        assert!(writer.write_all(b"more").is_err());
        drop(writer);
        assert_eq!(backend.count(Hook::EndOutput, "/w.txt"), 1);
        assert_eq!(backend.memory().read("/w.txt").unwrap(), b"partial");
    }
}
