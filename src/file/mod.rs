//! Byte-stream accessors for BAML decoding and encoding.
//!
//! This module is the accessor layer the codec is built on: bounds-checked primitive
//! I/O over byte buffers, a forward read cursor, and a growable patchable output
//! buffer. Nothing in here knows about records or trees; it only understands the
//! primitive encodings BAML shares with other .NET binary formats.
//!
//! # Key Components
//!
//! - [`crate::file::io`] - Little-endian primitive reads/writes over byte slices
//! - [`crate::file::parser::Parser`] - Read cursor with 7-bit integers and prefixed strings
//! - [`crate::file::writer::Writer`] - Growable output buffer with absolute-offset patching

pub mod io;
pub mod parser;
pub mod writer;
