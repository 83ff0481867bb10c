//! In-memory document model: typed record nodes, the arena tree, and the
//! top-level [`Image`] container.
//!
//! The model mirrors the record stream one to one. Every record becomes a node
//! ([`NodeKind`]) and every start/end record pair becomes one block node whose
//! children are the records between the pair. Cross-record references are
//! [`IdRef`] values that point at declaration nodes directly, so moving or
//! deleting declarations never invalidates numeric ids by accident.
//!
//! # Key Components
//!
//! - [`Image`] - Header plus tree; the load/save unit
//! - [`Tree`] - The node arena and all structural operations
//! - [`NodeKind`] - One typed variant per record
//! - [`IdRef`] - Reference to a declaration node or a well-known id

pub mod image;
pub mod node;
pub mod tree;

pub use image::{Image, VersionPair, SIGNATURE};
pub use node::{ElementFlags, IdRef, NodeId, NodeKind};
pub use tree::Tree;
