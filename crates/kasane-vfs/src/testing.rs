//! Test-only backend decorator that records hook calls and injects failures.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::backend::{Backend, HookResult};
use crate::backends::MemoryBackend;
use crate::fs::{FileSystem, FileSystemBuilder};
use crate::path::VfsPath;
use crate::types::{AttributeValue, FileType};

/// Hooks observed by [`RecordingBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Hook {
    Attach,
    Detach,
    FileType,
    ListChildren,
    Delete,
    CreateFolder,
    ContentSize,
    OpenInput,
    OpenOutput,
    EndInput,
    EndOutput,
    ChildrenChanged,
}

/// Wraps a [`MemoryBackend`], logging every hook call in order.
///
/// Failures registered with [`RecordingBackend::fail`] are returned as plain
/// `anyhow` errors, so they exercise the wrapping path of the core.
pub(crate) struct RecordingBackend {
    inner: MemoryBackend,
    calls: Mutex<Vec<(Hook, String)>>,
    failures: Mutex<HashMap<(Hook, String), String>>,
}

impl RecordingBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryBackend::new(),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
        })
    }

    pub(crate) fn memory(&self) -> &MemoryBackend {
        &self.inner
    }

    pub(crate) fn calls(&self) -> Vec<(Hook, String)> {
        self.calls.lock().clone()
    }

    /// Calls to any of `hooks`, in order.
    pub(crate) fn calls_of(&self, hooks: &[Hook]) -> Vec<(Hook, String)> {
        self.calls
            .lock()
            .iter()
            .filter(|(hook, _)| hooks.contains(hook))
            .cloned()
            .collect()
    }

    pub(crate) fn count(&self, hook: Hook, path: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(h, p)| *h == hook && p == path)
            .count()
    }

    /// Make `hook` fail for `path` with a non-VFS error.
    pub(crate) fn fail(&self, hook: Hook, path: &str, message: &str) {
        self.failures
            .lock()
            .insert((hook, path.to_string()), message.to_string());
    }

    fn record(&self, hook: Hook, path: &VfsPath) -> HookResult<()> {
        self.calls.lock().push((hook, path.to_string()));
        match self.failures.lock().get(&(hook, path.to_string())) {
            Some(message) => Err(anyhow::anyhow!("{message}")),
            None => Ok(()),
        }
    }
}

impl Backend for RecordingBackend {
    fn attach(&self, path: &VfsPath) -> HookResult<()> {
        self.record(Hook::Attach, path)?;
        self.inner.attach(path)
    }

    fn detach(&self, path: &VfsPath) {
        let _ = self.record(Hook::Detach, path);
        self.inner.detach(path)
    }

    fn is_read_only(&self, path: &VfsPath) -> bool {
        self.inner.is_read_only(path)
    }

    fn file_type(&self, path: &VfsPath) -> HookResult<Option<FileType>> {
        self.record(Hook::FileType, path)?;
        self.inner.file_type(path)
    }

    fn list_children(&self, path: &VfsPath) -> HookResult<Vec<String>> {
        self.record(Hook::ListChildren, path)?;
        self.inner.list_children(path)
    }

    fn delete(&self, path: &VfsPath) -> HookResult<()> {
        self.record(Hook::Delete, path)?;
        self.inner.delete(path)
    }

    fn create_folder(&self, path: &VfsPath) -> HookResult<()> {
        self.record(Hook::CreateFolder, path)?;
        self.inner.create_folder(path)
    }

    fn on_children_changed(&self, path: &VfsPath) {
        let _ = self.record(Hook::ChildrenChanged, path);
    }

    fn content_size(&self, path: &VfsPath) -> HookResult<u64> {
        self.record(Hook::ContentSize, path)?;
        self.inner.content_size(path)
    }

    fn open_input(&self, path: &VfsPath) -> HookResult<Box<dyn Read + Send>> {
        self.record(Hook::OpenInput, path)?;
        self.inner.open_input(path)
    }

    fn open_output(&self, path: &VfsPath) -> HookResult<Box<dyn Write + Send>> {
        self.record(Hook::OpenOutput, path)?;
        self.inner.open_output(path)
    }

    fn end_input(&self, path: &VfsPath) -> HookResult<()> {
        self.record(Hook::EndInput, path)?;
        self.inner.end_input(path)
    }

    fn end_output(&self, path: &VfsPath) -> HookResult<()> {
        self.record(Hook::EndOutput, path)?;
        self.inner.end_output(path)
    }

    fn last_modified(&self, path: &VfsPath) -> HookResult<SystemTime> {
        self.inner.last_modified(path)
    }

    fn set_last_modified(&self, path: &VfsPath, time: SystemTime) -> HookResult<()> {
        self.inner.set_last_modified(path, time)
    }

    fn attribute(&self, path: &VfsPath, name: &str) -> HookResult<Option<AttributeValue>> {
        self.inner.attribute(path, name)
    }

    fn set_attribute(&self, path: &VfsPath, name: &str, value: AttributeValue) -> HookResult<()> {
        self.inner.set_attribute(path, name, value)
    }
}

/// File system over a recording backend.
pub(crate) fn recording_fs(backend: &Arc<RecordingBackend>) -> Arc<FileSystem> {
    init_tracing();
    FileSystemBuilder::new(backend.clone()).build()
}

/// Route `tracing` output through the test harness.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
