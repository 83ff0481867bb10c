//! Top-level document container: header fields plus the record tree.
//!
//! An [`Image`] is the in-memory form of one compiled-markup stream. It pairs
//! the stream header (signature string and three format version pairs) with the
//! [`crate::Tree`] of records and a handle to the root document block. Loading
//! and saving are symmetric: [`Image::from_mem`] decodes a byte stream and
//! [`Image::to_vec`] re-encodes the tree, and a load/save cycle reproduces the
//! input byte for byte.
//!
//! # Usage Examples
//!
//! ```rust
//! use bamlscope::{Image, NodeKind};
//!
//! let mut image = Image::new();
//! let root = image.tree_mut().alloc(NodeKind::Document {
//!     load_async: false,
//!     max_async_records: 0,
//!     debug_baml: false,
//! });
//! image.tree_mut().set_closed(root, true);
//! image.set_root(Some(root));
//!
//! let bytes = image.to_vec()?;
//! let reloaded = Image::from_mem(&bytes)?;
//! assert_eq!(reloaded.signature(), "MSBAML");
//! # Ok::<(), bamlscope::Error>(())
//! ```

use std::{fs, path::Path};

use memmap2::Mmap;

use crate::{
    builder::build,
    document::{node::NodeId, tree::Tree},
    loader::load,
    Error, Result,
};

/// Default stream signature.
pub const SIGNATURE: &str = "MSBAML";

/// One (major, minor) format version pair from the stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionPair {
    /// Major component.
    pub major: u16,
    /// Minor component.
    pub minor: u16,
}

impl Default for VersionPair {
    fn default() -> Self {
        VersionPair {
            major: 0,
            minor: 0x60,
        }
    }
}

/// An entire compiled-markup stream, decoded.
///
/// Holds the header verbatim so that non-default signatures and versions
/// survive a load/save cycle unchanged.
#[derive(Debug)]
pub struct Image {
    signature: String,
    reader_version: VersionPair,
    updater_version: VersionPair,
    writer_version: VersionPair,
    tree: Tree,
    root: Option<NodeId>,
}

impl Default for Image {
    fn default() -> Self {
        Image::new()
    }
}

impl Image {
    /// Create an empty image with the default header
    /// (`"MSBAML"`, all versions `0.0x60`) and no records.
    #[must_use]
    pub fn new() -> Self {
        Image {
            signature: SIGNATURE.to_string(),
            reader_version: VersionPair::default(),
            updater_version: VersionPair::default(),
            writer_version: VersionPair::default(),
            tree: Tree::new(),
            root: None,
        }
    }

    /// Decode an image from a byte stream.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] for an empty slice and
    /// [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] for any
    /// stream that violates the format, including streams that contain a record
    /// this library refuses to process.
    pub fn from_mem(data: &[u8]) -> Result<Image> {
        if data.is_empty() {
            return Err(Error::Empty);
        }
        load(data)
    }

    /// [`Image::from_mem`] with the error collapsed to `None`, for callers that
    /// probe streams without caring why one was rejected.
    #[must_use]
    pub fn try_from_mem(data: &[u8]) -> Option<Image> {
        Image::from_mem(data).ok()
    }

    /// Decode an image from a file, memory-mapped read-only.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or
    /// mapped, otherwise the same errors as [`Image::from_mem`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Image> {
        let file = fs::File::open(path)?;
        let mmap = unsafe { Mmap::map(&file) }?;
        Image::from_mem(&mmap)
    }

    /// Re-encode the image into a byte stream.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] when the tree cannot be expressed in
    /// the format, e.g. a key whose value lies before the deferred content or a
    /// declaration pool that exceeds its id space.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        build(self)
    }

    /// [`Image::to_vec`] with the error collapsed to `None`, for callers that
    /// treat an unencodable tree the same way as an unreadable stream.
    #[must_use]
    pub fn try_to_vec(&self) -> Option<Vec<u8>> {
        self.to_vec().ok()
    }

    /// The stream signature, `"MSBAML"` for every stream the platform produces.
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Replace the stream signature.
    pub fn set_signature(&mut self, signature: impl Into<String>) {
        self.signature = signature.into();
    }

    /// The reader format version.
    #[must_use]
    pub fn reader_version(&self) -> VersionPair {
        self.reader_version
    }

    /// The updater format version.
    #[must_use]
    pub fn updater_version(&self) -> VersionPair {
        self.updater_version
    }

    /// The writer format version.
    #[must_use]
    pub fn writer_version(&self) -> VersionPair {
        self.writer_version
    }

    /// Replace all three format versions.
    pub fn set_versions(&mut self, reader: VersionPair, updater: VersionPair, writer: VersionPair) {
        self.reader_version = reader;
        self.updater_version = updater;
        self.writer_version = writer;
    }

    /// Borrow the record tree.
    #[must_use]
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Mutably borrow the record tree.
    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    /// The root document block, `None` for an image without records.
    #[must_use]
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Replace the root document block.
    pub fn set_root(&mut self, root: Option<NodeId>) {
        self.root = root;
    }

    pub(crate) fn from_parts(
        signature: String,
        reader_version: VersionPair,
        updater_version: VersionPair,
        writer_version: VersionPair,
        tree: Tree,
        root: Option<NodeId>,
    ) -> Image {
        Image {
            signature,
            reader_version,
            updater_version,
            writer_version,
            tree,
            root,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(Image::from_mem(&[]), Err(Error::Empty)));
        assert!(Image::try_from_mem(&[]).is_none());
    }

    #[test]
    fn new_image_has_default_header() {
        let image = Image::new();
        assert_eq!(image.signature(), SIGNATURE);
        assert_eq!(image.reader_version(), VersionPair { major: 0, minor: 0x60 });
        assert_eq!(image.updater_version(), VersionPair::default());
        assert_eq!(image.writer_version(), VersionPair::default());
        assert!(image.root().is_none());
        assert!(image.tree().is_empty());
    }

    #[test]
    fn missing_file_is_a_file_error() {
        let result = Image::from_file("/nonexistent/stream.baml");
        assert!(matches!(result, Err(Error::FileError(_))));
    }
}
