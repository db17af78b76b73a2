//! File selection policies for traversals.
//!
//! A [`FileSelector`] is asked two independent questions for every node a
//! traversal visits: should it be part of the result, and should the
//! traversal descend into it. The second question is only asked for folders.

use std::sync::Arc;

use crate::error::VfsResult;
use crate::node::FileNode;
use crate::types::FileType;

/// Traversal context handed to a selector.
#[derive(Debug, Clone)]
pub struct SelectInfo {
    pub(crate) base: Arc<FileNode>,
    pub(crate) file: Arc<FileNode>,
    pub(crate) depth: usize,
}

impl SelectInfo {
    pub(crate) fn new(base: Arc<FileNode>) -> Self {
        Self {
            file: Arc::clone(&base),
            base,
            depth: 0,
        }
    }

    /// Node the traversal started from.
    pub fn base(&self) -> &Arc<FileNode> {
        &self.base
    }

    /// Node being visited.
    pub fn file(&self) -> &Arc<FileNode> {
        &self.file
    }

    /// Depth of the visited node below the base; 0 for the base itself.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Decides which nodes a traversal selects and where it descends.
pub trait FileSelector {
    /// Include the visited node in the result?
    fn include_file(&self, info: &SelectInfo) -> VfsResult<bool>;

    /// Visit the children of the visited folder?
    fn traverse_descendants(&self, info: &SelectInfo) -> VfsResult<bool>;
}

/// Selects the base and everything below it.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllSelector;

impl FileSelector for AllSelector {
    fn include_file(&self, _info: &SelectInfo) -> VfsResult<bool> {
        Ok(true)
    }

    fn traverse_descendants(&self, _info: &SelectInfo) -> VfsResult<bool> {
        Ok(true)
    }
}

/// Selects nodes whose depth lies in `min..=max`.
#[derive(Debug, Clone, Copy)]
pub struct DepthSelector {
    /// Shallowest depth selected; 0 is the base.
    pub min: usize,
    /// Deepest depth selected.
    pub max: usize,
}

impl DepthSelector {
    /// Select depths `min..=max`.
    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }
}

impl FileSelector for DepthSelector {
    fn include_file(&self, info: &SelectInfo) -> VfsResult<bool> {
        Ok((self.min..=self.max).contains(&info.depth))
    }

    fn traverse_descendants(&self, info: &SelectInfo) -> VfsResult<bool> {
        Ok(info.depth < self.max)
    }
}

/// Selects only the base.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfSelector;

impl FileSelector for SelfSelector {
    fn include_file(&self, info: &SelectInfo) -> VfsResult<bool> {
        DepthSelector::new(0, 0).include_file(info)
    }

    fn traverse_descendants(&self, info: &SelectInfo) -> VfsResult<bool> {
        DepthSelector::new(0, 0).traverse_descendants(info)
    }
}

/// Selects the immediate children of the base.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChildrenSelector;

impl FileSelector for ChildrenSelector {
    fn include_file(&self, info: &SelectInfo) -> VfsResult<bool> {
        DepthSelector::new(1, 1).include_file(info)
    }

    fn traverse_descendants(&self, info: &SelectInfo) -> VfsResult<bool> {
        DepthSelector::new(1, 1).traverse_descendants(info)
    }
}

/// Selects the base and its immediate children.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfAndChildrenSelector;

impl FileSelector for SelfAndChildrenSelector {
    fn include_file(&self, info: &SelectInfo) -> VfsResult<bool> {
        DepthSelector::new(0, 1).include_file(info)
    }

    fn traverse_descendants(&self, info: &SelectInfo) -> VfsResult<bool> {
        DepthSelector::new(0, 1).traverse_descendants(info)
    }
}

/// Selects everything below the base, but not the base.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescendantsSelector;

impl FileSelector for DescendantsSelector {
    fn include_file(&self, info: &SelectInfo) -> VfsResult<bool> {
        Ok(info.depth > 0)
    }

    fn traverse_descendants(&self, _info: &SelectInfo) -> VfsResult<bool> {
        Ok(true)
    }
}

/// Selects every node of one type, descending everywhere.
#[derive(Debug, Clone, Copy)]
pub struct TypeSelector(pub FileType);

impl FileSelector for TypeSelector {
    fn include_file(&self, info: &SelectInfo) -> VfsResult<bool> {
        Ok(info.file.file_type()? == self.0)
    }

    fn traverse_descendants(&self, _info: &SelectInfo) -> VfsResult<bool> {
        Ok(true)
    }
}

/// Selector built from two closures.
pub struct FnSelector<I, T> {
    include: I,
    traverse: T,
}

impl<I, T> FnSelector<I, T>
where
    I: Fn(&SelectInfo) -> VfsResult<bool>,
    T: Fn(&SelectInfo) -> VfsResult<bool>,
{
    /// Wrap an include closure and a traverse closure.
    pub fn new(include: I, traverse: T) -> Self {
        Self { include, traverse }
    }
}

impl<I, T> FileSelector for FnSelector<I, T>
where
    I: Fn(&SelectInfo) -> VfsResult<bool>,
    T: Fn(&SelectInfo) -> VfsResult<bool>,
{
    fn include_file(&self, info: &SelectInfo) -> VfsResult<bool> {
        (self.include)(info)
    }

    fn traverse_descendants(&self, info: &SelectInfo) -> VfsResult<bool> {
        (self.traverse)(info)
    }
}
