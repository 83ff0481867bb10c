// Copyright 2025 bamlscope contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
//#![deny(unsafe_code)]
// - 'document/image.rs' uses mmap to map a file into memory

//! # bamlscope
//!
//! A reader and writer for the compiled-markup (BAML) binary streams embedded in
//! WPF assembly resources. Built in pure Rust, `bamlscope` decodes a stream into
//! an editable in-memory document tree and re-encodes the tree byte for byte,
//! without requiring Windows or the .NET runtime.
//!
//! ## Features
//!
//! - **Symmetric codec** - Loading then saving an untouched document reproduces the input exactly
//! - **Editable document tree** - Records become typed nodes in an arena; scoped records become blocks with children
//! - **Stable references** - Pool references point at declaration nodes, so edits never corrupt ids; slot numbers are reassigned on save
//! - **Deferred content** - Length-bounded resource-dictionary bodies and their relative key offsets are patched automatically
//! - **Strict and tolerant modes** - Fail fast with a detailed error, or probe with `try_from_mem`/`try_to_vec` and get `None`
//! - **Memory safe** - No decoding path reads out of bounds; damaged streams abort with [`Error::Malformed`]
//!
//! ## Quick Start
//!
//! Add `bamlscope` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! bamlscope = "0.1"
//! ```
//!
//! ### Using the Prelude
//!
//! For convenient access to the most commonly used types, import the prelude:
//!
//! ```rust,no_run
//! use bamlscope::prelude::*;
//!
//! let image = Image::from_file("App.baml")?;
//! println!("{} records", image.tree().len());
//! # Ok::<(), bamlscope::Error>(())
//! ```
//!
//! ### Loading, Editing, Saving
//!
//! ```rust
//! use bamlscope::{Image, NodeKind};
//!
//! # fn demo(bytes: &[u8]) -> bamlscope::Result<()> {
//! let mut image = Image::from_mem(bytes)?;
//! let root = image.root().ok_or(bamlscope::Error::Empty)?;
//!
//! // Rename every registered element.
//! let mut cur = Some(root);
//! while let Some(node) = cur {
//!     if let NodeKind::NamedElement { runtime_name, .. } = image.tree_mut().kind_mut(node) {
//!         *runtime_name = format!("renamed_{runtime_name}");
//!     }
//!     cur = image.tree().get_next(node);
//! }
//!
//! let bytes = image.to_vec()?;
//! # let _ = bytes;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The crate is organized in three layers:
//!
//! - [`file`] - Byte-level primitives: endian-aware reads and writes, the
//!   forward [`Parser`] cursor and the append-and-patch [`Writer`]
//! - [`records`] - The closed set of record tags and their classification
//!   (scoped, sized, forbidden)
//! - [`document`] - The arena tree, typed nodes and the [`Image`] container;
//!   the loader and builder translate between this layer and raw bytes
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`Result`]. A load or save pass aborts on
//! the first error; there are no partial documents and no partial output
//! buffers. [`Image::try_from_mem`] offers a tolerant front-end that collapses
//! any error into `None`, for probing resource entries that may or may not be
//! compiled markup.

#[macro_use]
pub(crate) mod error;

pub(crate) mod builder;
pub(crate) mod loader;

/// Byte-level stream primitives: endianness, the read cursor and the writer.
pub mod file;

/// Record tags and their wire-level classification.
pub mod records;

/// The in-memory document model: nodes, tree and image.
pub mod document;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust,no_run
/// use bamlscope::prelude::*;
///
/// let image = Image::from_file("Main.baml")?;
/// # Ok::<(), bamlscope::Error>(())
/// ```
pub mod prelude;

/// Result type alias used by every fallible operation in this crate.
///
/// # Examples
///
/// ```rust,no_run
/// use bamlscope::{Image, Result};
///
/// fn load(path: &str) -> Result<Image> {
///     Image::from_file(path)
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `bamlscope` Error type
///
/// The main error type for all operations in this crate. Provides detailed
/// error information for stream decoding, tree manipulation and encoding.
///
/// # Examples
///
/// ```rust,no_run
/// use bamlscope::{Error, Image};
///
/// match Image::from_file("Main.baml") {
///     Ok(image) => println!("Loaded successfully"),
///     Err(Error::Malformed { message, .. }) => println!("Malformed: {}", message),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
pub use error::Error;

/// Main entry point for working with compiled-markup streams.
///
/// See [`document::image::Image`] for loading, editing and saving.
///
/// # Example
///
/// ```rust,no_run
/// use bamlscope::Image;
/// let image = Image::from_file("Main.baml")?;
/// println!("signature: {}", image.signature());
/// # Ok::<(), bamlscope::Error>(())
/// ```
pub use document::image::Image;

/// The document model: arena tree, node handles, typed payloads and references.
pub use document::{ElementFlags, IdRef, NodeId, NodeKind, Tree, VersionPair, SIGNATURE};

/// Low-level stream reading and writing utilities.
///
/// # Example
///
/// ```rust
/// use bamlscope::Parser;
/// let data = [0x2A, 0x00];
/// let mut parser = Parser::new(&data);
/// let value: u16 = parser.read_le()?;
/// assert_eq!(value, 42);
/// # Ok::<(), bamlscope::Error>(())
/// ```
pub use file::{parser::Parser, writer::Writer};

/// Record tag values shared by the loader, builder and tree searches.
pub use records::RecordType;
