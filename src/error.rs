use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers all possible error conditions that can occur while decoding or encoding
/// BAML streams and while manipulating the document tree. A whole load or save pass aborts on
/// the first error; there is no partial decode or encode.
///
/// # Error Categories
///
/// ## Stream Format Errors
/// - [`Error::Malformed`] - Corrupted or invalid BAML record structure
/// - [`Error::OutOfBounds`] - Attempted to read or patch beyond buffer boundaries
/// - [`Error::Empty`] - Empty input provided
///
/// ## Tree Errors
/// - [`Error::NotFound`] - A required tree search produced no match
///
/// ## I/O Errors
/// - [`Error::FileError`] - Filesystem I/O errors
///
/// # Examples
///
/// ```rust
/// use bamlscope::{Error, Image};
///
/// match Image::from_mem(&[0x17]) {
///     Ok(image) => println!("Loaded {} nodes", image.tree().len()),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed stream: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The stream is damaged and could not be decoded, or the tree cannot be encoded.
    ///
    /// This single condition covers every fatal format violation: unknown or forbidden
    /// record tags, scope end-tag mismatches, declaration-pool slot gaps, malformed
    /// 7-bit integers or length-prefixed strings, negative key offsets, and references
    /// to unregistered pool entries. The error includes the source location where the
    /// malformation was detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while reading or patching the stream.
    ///
    /// This error occurs when trying to read data beyond the end of the input buffer,
    /// or when a backpatch targets an offset that was never written. It's a safety
    /// check to prevent buffer overruns.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// A required tree search found no matching node.
    ///
    /// Raised by the `require_*` search methods on the document tree when the
    /// caller demanded a match and none exists.
    #[error("No matching node was found")]
    NotFound,

    /// Provided input was empty.
    ///
    /// This error occurs when an empty buffer is provided where an actual BAML
    /// stream was expected.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur during file operations
    /// such as reading from disk, permission issues, or filesystem errors.
    #[error("{0}")]
    FileError(#[from] std::io::Error),
}
