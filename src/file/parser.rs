//! Forward cursor over a BAML byte stream.
//!
//! This module provides the [`crate::file::parser::Parser`] type, a cursor-based binary
//! reader designed for decoding BAML records. It offers bounds-checked access to binary
//! data with support for the encodings BAML uses: little-endian primitives, 7-bit
//! variable-length integers, length-prefixed UTF-8 strings, and raw UTF-16 code units.
//!
//! # Architecture
//!
//! The parser is built around a simple cursor-based model that maintains a position
//! within a byte slice:
//!
//! - **Position tracking** - Maintains current offset for sequential decoding
//! - **Bounds checking** - All operations validate data availability before reading
//! - **Type-safe reading** - Strongly typed methods for common data types
//!
//! # Usage Examples
//!
//! ```rust
//! use bamlscope::Parser;
//!
//! let data = [0x01, 0x02, 0x03, 0x04];
//! let mut parser = Parser::new(&data);
//!
//! let value = parser.read_le::<u16>()?;
//! assert_eq!(value, 0x0201);
//! # Ok::<(), bamlscope::Error>(())
//! ```

use crate::{
    file::io::{read_le_at, BamlIO},
    Result,
};

/// A cursor-based binary reader for BAML streams.
///
/// `Parser` provides a forward-only (with explicit [`Parser::seek`]) interface for
/// reading binary data in little-endian format. It maintains an internal position
/// cursor and bounds-checks every read to prevent buffer overruns when decoding
/// malformed or truncated data.
///
/// # Examples
///
/// ```rust
/// use bamlscope::Parser;
///
/// // 7-bit length prefix (5) followed by "Hello"
/// let data = [5, b'H', b'e', b'l', b'l', b'o'];
/// let mut parser = Parser::new(&data);
/// assert_eq!(parser.read_prefixed_string_utf8()?, "Hello");
/// # Ok::<(), bamlscope::Error>(())
/// ```
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`crate::file::parser::Parser`] from a byte slice.
    ///
    /// # Arguments
    /// * `data` - The byte slice to read from
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the underlying data buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the parser has no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if there is more data available to parse.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Get the current position of the parser within the data buffer.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Move the current position to the specified index.
    ///
    /// Seeking to the end of the data (one past the last byte) is permitted; any
    /// position beyond that is rejected.
    ///
    /// # Arguments
    /// * `pos` - The position to move the cursor to
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if position is beyond the data length.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Move the position forward by the specified number of bytes.
    ///
    /// # Arguments
    /// * `step` - Amount of bytes to advance
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if advancing by step would exceed the data length.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        if self.position + step > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position += step;
        Ok(())
    }

    /// Peek at the next byte without advancing the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if position is at or beyond the data length.
    pub fn peek_byte(&self) -> Result<u8> {
        if self.position >= self.data.len() {
            return Err(out_of_bounds_error!());
        }
        Ok(self.data[self.position])
    }

    /// Read a type `T` from the current position in little-endian format and advance
    /// the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length.
    pub fn read_le<T: BamlIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Read a single-byte boolean. Any non-zero value decodes as `true`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_le::<u8>()? != 0)
    }

    /// Borrow `len` raw bytes from the current position and advance past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.position + len > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        let bytes = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(bytes)
    }

    /// Read a 7-bit encoded integer (used in .NET for variable-length encoding).
    ///
    /// This encoding uses the most significant bit of each byte as a continuation flag.
    /// If set, the next byte is part of the value. The value is reconstructed by
    /// concatenating the lower 7 bits of each byte in little-endian order.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length or
    /// [`crate::Error::Malformed`] for invalid encoding (overflow).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bamlscope::Parser;
    ///
    /// // Two bytes: 128 (0x80 0x01)
    /// let data = [0x80, 0x01];
    /// let mut parser = Parser::new(&data);
    /// assert_eq!(parser.read_7bit_encoded_int()?, 128);
    /// # Ok::<(), bamlscope::Error>(())
    /// ```
    pub fn read_7bit_encoded_int(&mut self) -> Result<u32> {
        let mut value = 0u32;
        let mut shift = 0;

        loop {
            if self.position >= self.data.len() {
                return Err(out_of_bounds_error!());
            }

            let byte = self.data[self.position];
            self.position += 1;

            value |= u32::from(byte & 0x7F) << shift;
            shift += 7;

            if (byte & 0x80) == 0 {
                break;
            }

            // A u32 can hold at most 32 bits; after 4 bytes we've read 28 bits.
            // A 5th continuation byte would push past 32 bits, causing overflow.
            if shift >= 32 {
                return Err(malformed_error!(
                    "7-bit encoded integer overflow: value exceeds u32 capacity after {} bits",
                    shift
                ));
            }
        }

        Ok(value)
    }

    /// Read a length-prefixed UTF-8 string.
    ///
    /// The string length is encoded as a 7-bit encoded integer, followed by that many
    /// UTF-8 bytes. This is the format BAML uses for every string field inside records.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length or
    /// [`crate::Error::Malformed`] for invalid UTF-8 encoding.
    pub fn read_prefixed_string_utf8(&mut self) -> Result<String> {
        let length = self.read_7bit_encoded_int()? as usize;

        if self.position + length > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        let string_data = &self.data[self.position..self.position + length];
        self.position += length;

        String::from_utf8(string_data.to_vec()).map_err(|e| {
            malformed_error!(
                "Invalid UTF-8 string at offset {}-{}: {}",
                self.position - length,
                self.position,
                e.utf8_error()
            )
        })
    }

    /// Read a UTF-16LE string spanning exactly `byte_len` bytes.
    ///
    /// Used for the stream header's feature id, whose byte length is declared by a
    /// preceding 32-bit field rather than a 7-bit prefix.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length or
    /// [`crate::Error::Malformed`] if `byte_len` is odd or the code units are not
    /// valid UTF-16.
    pub fn read_string_utf16(&mut self, byte_len: usize) -> Result<String> {
        if byte_len % 2 != 0 {
            return Err(malformed_error!("Invalid UTF-16 length - {}", byte_len));
        }

        let mut units: Vec<u16> = Vec::with_capacity(byte_len / 2);
        for _ in 0..byte_len / 2 {
            units.push(self.read_le::<u16>()?);
        }

        widestring::U16String::from_vec(units)
            .to_string()
            .map_err(|e| malformed_error!("Invalid UTF-16 string - {}", e))
    }
}
