//!
//! Codec primitives for the Minecraft wire protocol. Can be used in a `no_std` environment, but
//! can't be used without `alloc`.
//!
//! This crate covers the protocol's primitive and composite data types:
//!
//! * Fixed-width big-endian scalars (implemented directly on the integer and float primitives)
//! * [`types::VarInt`] and [`types::VarLong`]
//! * [`types::VarString`] and [`types::JavaString`]
//! * [`types::PrefixedArray`]
//!
//! All types read from and write to the stream traits of `sculk-stream` rather than in-memory
//! buffers, because the connection layer hands packet bodies to decoders as bounded streams.
//!
//! # Features
//! * `std` (default): enables conversion from [`CodecError`] to `std::io::Error`.

#![no_std]

pub(crate) extern crate alloc;

#[cfg(feature = "std")]
pub(crate) extern crate std;

///
/// Wire type definitions.
pub mod types;

///
/// UTF-8 decoding with UTF-16 code-unit accounting.
pub mod utf;

use alloc::string::String;
use core::fmt::{Display, Formatter};
use sculk_stream::{InputStream, OutputStream, StreamError};

///
/// A type with a defined wire form.
///
/// Reading always consumes exactly the bytes that make up one value; writing always produces a
/// form that `read` will accept.
pub trait ProtocolType: Sized {
    ///
    /// Reads one value from the stream.
    ///
    /// # Errors
    /// Returns `Err` if the stream runs short or the encountered bytes are invalid for this type.
    fn read<S: InputStream + ?Sized>(read: &mut S) -> Result<Self>;

    ///
    /// Writes this value to the stream.
    ///
    /// # Errors
    /// Returns `Err` if the stream refuses bytes, or if the value cannot be represented on the
    /// wire (for example a `JavaString` longer than 65535 encoded bytes).
    fn write<S: OutputStream + ?Sized>(&self, write: &mut S) -> Result<()>;
}

///
/// Type alias used for the result of codec operations.
pub type Result<T> = core::result::Result<T, CodecError>;

///
/// Common error type for wire encoding and decoding failures.
#[derive(Debug)]
pub struct CodecError {
    kind: ErrorKind,
}

///
/// Reason for a codec error. See [`CodecError`].
#[derive(Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    ///
    /// The underlying stream failed; most commonly it ran out of bytes mid-value.
    Stream(StreamError),

    ///
    /// The bytes on the wire do not form a valid value: varint overflow, ill-formed UTF-8,
    /// negative length prefixes, and the like.
    Malformed(Option<Message>),

    ///
    /// A value exceeds a declared cap, such as a string's code-unit limit.
    TooLong(Option<Message>),
}

///
/// An error message. Either [`Message::Static`] (a fixed message) or [`Message::Owned`] (built at
/// runtime). Prefer the static form; it avoids allocating on error paths.
#[derive(Clone, Debug)]
pub enum Message {
    ///
    /// A static message, generally a string literal.
    Static(&'static str),

    ///
    /// An owned message.
    Owned(String),
}

impl CodecError {
    ///
    /// Creates a new [`CodecError`] from the specified [`ErrorKind`].
    pub const fn new(kind: ErrorKind) -> Self {
        Self { kind }
    }

    ///
    /// Shorthand for a [`ErrorKind::Malformed`] error with a static message.
    #[must_use]
    pub const fn malformed(message: &'static str) -> Self {
        Self::new(ErrorKind::Malformed(Some(Message::Static(message))))
    }

    ///
    /// Shorthand for a [`ErrorKind::TooLong`] error with a static message.
    #[must_use]
    pub const fn too_long(message: &'static str) -> Self {
        Self::new(ErrorKind::TooLong(Some(Message::Static(message))))
    }

    ///
    /// The reason for this error.
    #[must_use]
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl AsRef<str> for Message {
    fn as_ref(&self) -> &str {
        match self {
            Message::Static(message) => message,
            Message::Owned(message) => message.as_str(),
        }
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match &self.kind {
            ErrorKind::Stream(stream) => write!(f, "stream error: {stream}"),
            ErrorKind::Malformed(message) => match message {
                None => f.write_str("malformed data"),
                Some(message) => write!(f, "malformed data: {message}"),
            },
            ErrorKind::TooLong(message) => match message {
                None => f.write_str("value too long"),
                Some(message) => write!(f, "value too long: {message}"),
            },
        }
    }
}

impl core::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Stream(stream) => Some(stream),
            _ => None,
        }
    }
}

impl From<StreamError> for CodecError {
    fn from(value: StreamError) -> Self {
        CodecError::new(ErrorKind::Stream(value))
    }
}

#[cfg(feature = "std")]
impl From<CodecError> for std::io::Error {
    fn from(value: CodecError) -> Self {
        match value.kind {
            ErrorKind::Stream(stream) => stream.into(),
            _ => std::io::Error::new(std::io::ErrorKind::InvalidData, value),
        }
    }
}

///
/// Shorthand for creating a codec error with a static message.
///
/// # Example
/// ```
/// use sculk_protocol::codec_error;
///
/// // a Result with an error of `sculk_protocol::CodecError`
/// let res: sculk_protocol::Result<()> = codec_error!(Malformed "bad continuation byte");
/// assert!(res.is_err());
///
/// // use `*` to get the bare error instead of a Result
/// let err = codec_error!(*TooLong "string exceeds cap");
/// ```
#[macro_export]
macro_rules! codec_error {
    ( Malformed $lit:expr ) => {
        core::result::Result::Err($crate::CodecError::malformed($lit))
    };

    ( *Malformed $lit:expr ) => {
        $crate::CodecError::malformed($lit)
    };

    ( TooLong $lit:expr ) => {
        core::result::Result::Err($crate::CodecError::too_long($lit))
    };

    ( *TooLong $lit:expr ) => {
        $crate::CodecError::too_long($lit)
    };
}
