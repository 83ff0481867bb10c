//! # bamlscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types
//! from the bamlscope library. Import this module to get quick access to the
//! essential types for loading, editing and saving compiled-markup streams.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all bamlscope operations
pub use crate::Error;

/// The result type used throughout bamlscope
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Main entry point: a decoded compiled-markup stream
pub use crate::Image;

/// Low-level stream reading and writing utilities
pub use crate::{Parser, Writer};

// ================================================================================================
// Document Model
// ================================================================================================

/// The node arena and structural operations
pub use crate::Tree;

/// Node handles, typed payloads and references
pub use crate::{ElementFlags, IdRef, NodeId, NodeKind};

/// Header version pairs and the default signature
pub use crate::{VersionPair, SIGNATURE};

// ================================================================================================
// Wire Format
// ================================================================================================

/// Record tag values and tag classification
pub use crate::RecordType;
