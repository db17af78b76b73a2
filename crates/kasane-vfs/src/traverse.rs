//! Selector-driven depth-first traversal.

use std::sync::Arc;

use crate::error::VfsResult;
use crate::node::FileNode;
use crate::selector::{FileSelector, SelectInfo};
use crate::types::FileType;

/// Visit `info.file` and, where the selector allows, its descendants.
///
/// Selected nodes are appended to `selected` before their children when
/// `depthwise` is false (pre-order), after them when it is true (post-order).
/// `info.file` and `info.depth` are restored before returning.
pub(crate) fn traverse(
    info: &mut SelectInfo,
    selector: &dyn FileSelector,
    depthwise: bool,
    selected: &mut Vec<Arc<FileNode>>,
) -> VfsResult<()> {
    let include = selector.include_file(info)?;
    let file = Arc::clone(&info.file);

    if !depthwise && include {
        selected.push(Arc::clone(&file));
    }

    if file.file_type()? == FileType::Folder && selector.traverse_descendants(info)? {
        let depth = info.depth;
        info.depth = depth + 1;

        for child in file.children()? {
            info.file = child;
            traverse(info, selector, depthwise, selected)?;
        }

        info.file = Arc::clone(&file);
        info.depth = depth;
    }

    if depthwise && include {
        selected.push(file);
    }
    Ok(())
}
