//! Growable, offset-addressed output buffer for BAML encoding.
//!
//! This module provides the [`crate::file::writer::Writer`] type, the inverse of
//! [`crate::file::parser::Parser`]: a growable byte vector with a position cursor that
//! supports the encodings BAML uses (little-endian primitives, 7-bit variable-length
//! integers, length-prefixed UTF-8 strings, UTF-16 code units).
//!
//! Unlike a one-way stream, the buffer is addressable by absolute offset: record
//! envelopes that cannot know their size up front reserve space with
//! [`Writer::reserve`] and later fix it up with [`Writer::patch_le`]. This is the
//! mechanism behind the deferable-content length field and the dictionary key
//! offsets, both of which are only known after the enclosed subtree has been written.
//!
//! # Usage Examples
//!
//! ```rust
//! use bamlscope::Writer;
//!
//! let mut writer = Writer::new();
//! let field = writer.reserve(4);
//! writer.write_le(0xBBu8);
//! writer.patch_le(field, 0x11223344u32)?;
//! assert_eq!(writer.data(), &[0x44, 0x33, 0x22, 0x11, 0xBB]);
//! # Ok::<(), bamlscope::Error>(())
//! ```

use crate::{
    file::io::{write_le_at, BamlIO},
    Result,
};

/// A growable output buffer with an absolute-offset patching interface.
///
/// `Writer` appends at its cursor, growing the underlying vector as needed, and
/// allows bounds-checked rewrites of already-emitted regions. It is the single
/// output abstraction used by the encoder; scratch instances of it also serve as
/// the temporary payload buffers for variable-size record envelopes.
#[derive(Default)]
pub struct Writer {
    /// The bytes emitted so far
    data: Vec<u8>,
    /// Current cursor position within (or at the end of) the data
    position: usize,
}

impl Writer {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Writer {
            data: Vec::new(),
            position: 0,
        }
    }

    /// Current cursor position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Number of bytes emitted so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if nothing has been written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow the emitted bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the writer and return the emitted bytes.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Write a primitive in little-endian format at the cursor, growing the buffer
    /// if the cursor is at its end.
    pub fn write_le<T: BamlIO>(&mut self, value: T) {
        let type_len = std::mem::size_of::<T>();
        self.ensure(type_len);

        // Cannot fail: ensure() made room for type_len bytes.
        let _ = write_le_at(&mut self.data, &mut self.position, value);
    }

    /// Write a single-byte boolean (1 for `true`, 0 for `false`).
    pub fn write_bool(&mut self, value: bool) {
        self.write_le::<u8>(u8::from(value));
    }

    /// Append raw bytes at the cursor.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.ensure(bytes.len());
        self.data[self.position..self.position + bytes.len()].copy_from_slice(bytes);
        self.position += bytes.len();
    }

    /// Write a 7-bit encoded integer: 7 bits per byte, little-endian, with the most
    /// significant bit of each byte as the continuation flag.
    pub fn write_7bit_encoded_int(&mut self, mut value: u32) {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.write_le(byte);
                break;
            }
            self.write_le(byte | 0x80);
        }
    }

    /// Write a length-prefixed UTF-8 string (7-bit encoded byte length, then the bytes).
    pub fn write_prefixed_string_utf8(&mut self, value: &str) {
        self.write_7bit_encoded_int(value.len() as u32);
        self.write_bytes(value.as_bytes());
    }

    /// Write a string as raw UTF-16LE code units, no prefix. Returns the number of
    /// bytes emitted.
    pub fn write_string_utf16(&mut self, value: &str) -> usize {
        let units = widestring::U16String::from_str(value).into_vec();
        for unit in &units {
            self.write_le(*unit);
        }
        units.len() * 2
    }

    /// Reserve `len` zero bytes at the cursor and return their starting offset.
    ///
    /// The reserved region is expected to be filled in later via [`Writer::patch_le`].
    pub fn reserve(&mut self, len: usize) -> usize {
        let start = self.position;
        self.ensure(len);
        self.position += len;
        start
    }

    /// Overwrite an already-emitted region at an absolute offset, without moving
    /// the cursor.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the target region was never written.
    pub fn patch_le<T: BamlIO>(&mut self, offset: usize, value: T) -> Result<()> {
        let mut offset = offset;
        write_le_at(&mut self.data, &mut offset, value)
    }

    /// Number of bytes the 7-bit encoding of `value` occupies.
    #[must_use]
    pub fn size_of_7bit_encoded_int(mut value: u32) -> u32 {
        let mut size = 1;
        while value >= 0x80 {
            value >>= 7;
            size += 1;
        }
        size
    }

    fn ensure(&mut self, len: usize) {
        if self.position + len > self.data.len() {
            self.data.resize(self.position + len, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, Parser};

    #[test]
    fn write_le_appends() {
        let mut writer = Writer::new();
        writer.write_le(0x1234u16);
        writer.write_le(0x56u8);
        assert_eq!(writer.data(), &[0x34, 0x12, 0x56]);
        assert_eq!(writer.pos(), 3);
    }

    #[test]
    fn reserve_and_patch() {
        let mut writer = Writer::new();
        writer.write_le(0xAAu8);
        let field = writer.reserve(4);
        writer.write_le(0xBBu8);

        writer.patch_le(field, 0x0102_0304u32).unwrap();
        assert_eq!(writer.data(), &[0xAA, 0x04, 0x03, 0x02, 0x01, 0xBB]);
        // Patching never moves the cursor.
        assert_eq!(writer.pos(), 6);
    }

    #[test]
    fn patch_out_of_bounds() {
        let mut writer = Writer::new();
        writer.write_le(0u8);
        assert!(matches!(
            writer.patch_le(0, 0u32),
            Err(Error::OutOfBounds)
        ));
    }

    #[test]
    fn seven_bit_round_trip() {
        for value in [0u32, 1, 127, 128, 0x3FFF, 0x4000, 624_485, u32::MAX] {
            let mut writer = Writer::new();
            writer.write_7bit_encoded_int(value);
            assert_eq!(
                writer.len() as u32,
                Writer::size_of_7bit_encoded_int(value)
            );

            let data = writer.into_vec();
            let mut parser = Parser::new(&data);
            assert_eq!(parser.read_7bit_encoded_int().unwrap(), value);
        }
    }

    #[test]
    fn prefixed_utf8_round_trip() {
        let mut writer = Writer::new();
        writer.write_prefixed_string_utf8("System.Windows.Controls.Button");

        let data = writer.into_vec();
        let mut parser = Parser::new(&data);
        assert_eq!(
            parser.read_prefixed_string_utf8().unwrap(),
            "System.Windows.Controls.Button"
        );
    }

    #[test]
    fn utf16_emits_pairs() {
        let mut writer = Writer::new();
        let written = writer.write_string_utf16("MSBAML");
        assert_eq!(written, 12);
        assert_eq!(writer.data()[0..4], [b'M', 0, b'S', 0]);
    }
}
