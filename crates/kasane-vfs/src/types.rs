//! Core VFS types.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Kind of an existing file.
///
/// Nonexistence is not a file type; it shows up as `None` wherever a type is
/// optional (for example [`crate::Backend::file_type`]).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FileType {
    /// Regular file with content.
    File,
    /// Folder with children.
    Folder,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a folder.
    pub fn is_folder(&self) -> bool {
        matches!(self, FileType::Folder)
    }

    /// Returns true if files of this type may have children.
    pub fn has_children(&self) -> bool {
        self.is_folder()
    }

    /// Returns true if files of this type have content.
    pub fn has_content(&self) -> bool {
        self.is_file()
    }
}

/// Value of a named backend attribute.
pub type AttributeValue = serde_json::Value;

/// A DER-encoded certificate that signed a file's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate(pub Vec<u8>);

impl Certificate {
    /// The raw DER bytes.
    pub fn der(&self) -> &[u8] {
        &self.0
    }
}
