use crate::utf::{decode_utf8, utf16_len};
use crate::{codec_error, ProtocolType, Result};
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt::{Display, Formatter};
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use sculk_stream::{InputStream, OutputStream};

///
/// The maximum number of bytes a [`VarInt`] may occupy on the wire.
pub const MAX_VAR_INT_BYTES: usize = 5;

///
/// The maximum number of bytes a [`VarLong`] may occupy on the wire.
pub const MAX_VAR_LONG_BYTES: usize = 10;

const SEGMENT_BITS: u8 = 0x7F;
const CONTINUE_BIT: u8 = 0x80;

// Highest value the final byte of a varint may hold: the leftover 4 bits of an i32, or the
// leftover single bit of an i64.
const VAR_INT_LAST_BYTE_MAX: u8 = 0x0F;
const VAR_LONG_LAST_BYTE_MAX: u8 = 0x01;

macro_rules! fixed_impl {
    ( $( $ty:ty ),* ) => {
        $(
            impl ProtocolType for $ty {
                fn read<S: InputStream + ?Sized>(read: &mut S) -> Result<Self> {
                    let mut buf = [0_u8; size_of::<$ty>()];
                    read.read_exact(&mut buf)?;
                    Ok(<$ty>::from_be_bytes(buf))
                }

                fn write<S: OutputStream + ?Sized>(&self, write: &mut S) -> Result<()> {
                    write.write_all(&self.to_be_bytes())?;
                    Ok(())
                }
            }
        )*
    };
}

fixed_impl!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

impl ProtocolType for bool {
    fn read<S: InputStream + ?Sized>(read: &mut S) -> Result<Self> {
        match u8::read(read)? {
            0 => Ok(false),
            1 => Ok(true),
            _ => codec_error!(Malformed "boolean byte must be 0 or 1"),
        }
    }

    fn write<S: OutputStream + ?Sized>(&self, write: &mut S) -> Result<()> {
        u8::from(*self).write(write)
    }
}

macro_rules! leb_128_impl {
    ( $name:ident, $val:ty, $uval:ty, $max_bytes:expr, $last_max:expr, $len_fn:ident, $err:literal ) => {
        impl $name {
            ///
            /// The number of bytes writing this value will produce. Always in range
            /// `[1, MAX]` for the type's maximum varint width.
            #[must_use]
            pub const fn len(&self) -> usize {
                $len_fn(self.0)
            }
        }

        ///
        /// Returns the number of bytes required to encode the given value in its variable-length
        /// form.
        #[must_use]
        pub const fn $len_fn(value: $val) -> usize {
            let value = value as $uval;
            let bits = <$uval>::BITS - (value | 1).leading_zeros();
            bits.div_ceil(7) as usize
        }

        impl ProtocolType for $name {
            fn read<S: InputStream + ?Sized>(read: &mut S) -> Result<Self> {
                let mut value: $uval = 0;
                let mut byte = [0_u8; 1];

                for i in 0..$max_bytes {
                    read.read_exact(&mut byte)?;
                    let current = byte[0];

                    value |= ((current & SEGMENT_BITS) as $uval) << (i * 7);

                    if i == $max_bytes - 1 {
                        // the unused high bits of the final byte must be zero, which also rules
                        // out a dangling continuation bit
                        if current > $last_max {
                            return codec_error!(Malformed $err);
                        }
                    } else if current & CONTINUE_BIT == 0 {
                        break;
                    }
                }

                Ok(Self(value as $val))
            }

            fn write<S: OutputStream + ?Sized>(&self, write: &mut S) -> Result<()> {
                let mut value = self.0 as $uval;

                loop {
                    let byte = (value as u8) & SEGMENT_BITS;
                    value >>= 7;

                    if value == 0 {
                        write.write_all(&[byte])?;
                        return Ok(());
                    }

                    write.write_all(&[byte | CONTINUE_BIT])?;
                }
            }
        }

        impl From<$val> for $name {
            fn from(value: $val) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $val {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl Deref for $name {
            type Target = $val;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
                Display::fmt(&self.0, f)
            }
        }
    };
}

///
/// A 32-bit signed integer with the protocol's variable-length wire form: LEB128 with 7 data bits
/// per byte and the continuation bit in the MSB, at most [`MAX_VAR_INT_BYTES`] bytes.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct VarInt(pub i32);

///
/// The 64-bit equivalent of [`VarInt`], at most [`MAX_VAR_LONG_BYTES`] bytes.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct VarLong(pub i64);

leb_128_impl!(
    VarInt,
    i32,
    u32,
    MAX_VAR_INT_BYTES,
    VAR_INT_LAST_BYTE_MAX,
    var_int_len,
    "32-bit LEB128 number out of range"
);

leb_128_impl!(
    VarLong,
    i64,
    u64,
    MAX_VAR_LONG_BYTES,
    VAR_LONG_LAST_BYTE_MAX,
    var_long_len,
    "64-bit LEB128 number out of range"
);

///
/// The protocol's standard string: a [`VarInt`] *byte* length followed by UTF-8.
///
/// `MAX_CODE_UNITS` bounds the decoded length in UTF-16 code units; the byte length is bounded
/// upfront by four times that, before any decoding happens. A parameter of 0 disables both
/// checks.
///
/// 32767 is the largest length the protocol currently allows in most contexts; see [`UString`].
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct VarString<const MAX_CODE_UNITS: usize> {
    value: String,
}

///
/// A [`VarString`] with the protocol's usual 32767 code-unit cap.
pub type UString = VarString<32767>;

impl<const MAX_CODE_UNITS: usize> VarString<MAX_CODE_UNITS> {
    ///
    /// Creates a string, validating the code-unit cap.
    ///
    /// # Errors
    /// Returns a `TooLong` error if the value exceeds `MAX_CODE_UNITS` UTF-16 code units.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if MAX_CODE_UNITS > 0 && utf16_len(&value) > MAX_CODE_UNITS {
            return codec_error!(TooLong "string exceeds its code unit cap");
        }

        Ok(Self { value })
    }

    ///
    /// A view of the contained string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    ///
    /// Consumes `self`, returning the contained string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.value
    }

    ///
    /// The string's length in UTF-16 code units.
    #[must_use]
    pub fn code_units(&self) -> usize {
        utf16_len(&self.value)
    }
}

impl<const MAX_CODE_UNITS: usize> ProtocolType for VarString<MAX_CODE_UNITS> {
    fn read<S: InputStream + ?Sized>(read: &mut S) -> Result<Self> {
        let byte_len = VarInt::read(read)?.0;
        if byte_len < 0 {
            return codec_error!(Malformed "string has negative byte length");
        }

        #[allow(clippy::cast_sign_loss, reason = "Negative lengths were rejected above")]
        let byte_len = byte_len as usize;
        if MAX_CODE_UNITS > 0 && byte_len > MAX_CODE_UNITS * 4 {
            return codec_error!(TooLong "string byte length exceeds four times its code unit cap");
        }

        let mut bytes = vec![0_u8; byte_len];
        read.read_exact(&mut bytes)?;

        let decoded = decode_utf8(&bytes)?;
        if MAX_CODE_UNITS > 0 && decoded.code_units > MAX_CODE_UNITS {
            return codec_error!(TooLong "string exceeds its code unit cap");
        }

        Ok(Self {
            value: decoded.string,
        })
    }

    fn write<S: OutputStream + ?Sized>(&self, write: &mut S) -> Result<()> {
        let bytes = self.value.as_bytes();
        let Ok(byte_len) = i32::try_from(bytes.len()) else {
            return codec_error!(TooLong "string byte length exceeds the VarInt prefix range");
        };

        VarInt(byte_len).write(write)?;
        write.write_all(bytes)?;
        Ok(())
    }
}

impl<const MAX_CODE_UNITS: usize> Display for VarString<MAX_CODE_UNITS> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.value)
    }
}

///
/// A string in Java's wire form: a big-endian `u16` *byte* length followed by UTF-8. Used for NBT
/// tag names and string payloads.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct JavaString(pub String);

impl JavaString {
    ///
    /// A view of the contained string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    ///
    /// Consumes `self`, returning the contained string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl ProtocolType for JavaString {
    fn read<S: InputStream + ?Sized>(read: &mut S) -> Result<Self> {
        let byte_len = usize::from(u16::read(read)?);

        let mut bytes = vec![0_u8; byte_len];
        read.read_exact(&mut bytes)?;

        Ok(Self(decode_utf8(&bytes)?.string))
    }

    fn write<S: OutputStream + ?Sized>(&self, write: &mut S) -> Result<()> {
        let bytes = self.0.as_bytes();
        let Ok(byte_len) = u16::try_from(bytes.len()) else {
            return codec_error!(TooLong "string byte length exceeds the u16 prefix range");
        };

        byte_len.write(write)?;
        write.write_all(bytes)?;
        Ok(())
    }
}

impl From<String> for JavaString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JavaString {
    fn from(value: &str) -> Self {
        Self(String::from(value))
    }
}

impl Display for JavaString {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

///
/// A length prefix flavour for [`PrefixedArray`].
pub trait LengthPrefix {
    ///
    /// Reads a length from the stream.
    ///
    /// # Errors
    /// Returns `Err` on stream failure or a negative encoded length.
    fn read_len<S: InputStream + ?Sized>(read: &mut S) -> Result<usize>;

    ///
    /// Writes a length to the stream.
    ///
    /// # Errors
    /// Returns a `TooLong` error if `len` exceeds the prefix type's range.
    fn write_len<S: OutputStream + ?Sized>(len: usize, write: &mut S) -> Result<()>;
}

impl LengthPrefix for VarInt {
    fn read_len<S: InputStream + ?Sized>(read: &mut S) -> Result<usize> {
        let len = VarInt::read(read)?.0;
        usize::try_from(len).map_err(|_| codec_error!(*Malformed "negative length prefix"))
    }

    fn write_len<S: OutputStream + ?Sized>(len: usize, write: &mut S) -> Result<()> {
        let Ok(len) = i32::try_from(len) else {
            return codec_error!(TooLong "length exceeds the VarInt prefix range");
        };

        VarInt(len).write(write)
    }
}

impl LengthPrefix for i32 {
    fn read_len<S: InputStream + ?Sized>(read: &mut S) -> Result<usize> {
        let len = i32::read(read)?;
        usize::try_from(len).map_err(|_| codec_error!(*Malformed "negative length prefix"))
    }

    fn write_len<S: OutputStream + ?Sized>(len: usize, write: &mut S) -> Result<()> {
        let Ok(len) = i32::try_from(len) else {
            return codec_error!(TooLong "length exceeds the i32 prefix range");
        };

        len.write(write)
    }
}

impl LengthPrefix for u16 {
    fn read_len<S: InputStream + ?Sized>(read: &mut S) -> Result<usize> {
        Ok(usize::from(u16::read(read)?))
    }

    fn write_len<S: OutputStream + ?Sized>(len: usize, write: &mut S) -> Result<()> {
        let Ok(len) = u16::try_from(len) else {
            return codec_error!(TooLong "length exceeds the u16 prefix range");
        };

        len.write(write)
    }
}

///
/// A length-prefixed sequence of elements. `L` selects the prefix flavour; the protocol's default
/// is a [`VarInt`] prefix, while NBT's payload arrays use a plain big-endian `i32`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct PrefixedArray<T, L = VarInt> {
    elements: Vec<T>,
    marker: PhantomData<L>,
}

impl<T, L> PrefixedArray<T, L> {
    ///
    /// Creates an array from a vector of elements.
    #[must_use]
    pub fn new(elements: Vec<T>) -> Self {
        Self {
            elements,
            marker: PhantomData,
        }
    }

    ///
    /// Consumes `self`, returning the elements.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.elements
    }
}

impl<T, L> Default for PrefixedArray<T, L> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T, L> From<Vec<T>> for PrefixedArray<T, L> {
    fn from(elements: Vec<T>) -> Self {
        Self::new(elements)
    }
}

impl<T, L> Deref for PrefixedArray<T, L> {
    type Target = Vec<T>;

    fn deref(&self) -> &Self::Target {
        &self.elements
    }
}

impl<T, L> DerefMut for PrefixedArray<T, L> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.elements
    }
}

impl<T, L> ProtocolType for PrefixedArray<T, L>
where
    T: ProtocolType,
    L: LengthPrefix,
{
    fn read<S: InputStream + ?Sized>(read: &mut S) -> Result<Self> {
        let len = L::read_len(read)?;

        let mut elements = Vec::with_capacity(len);
        for _ in 0..len {
            elements.push(T::read(read)?);
        }

        Ok(Self::new(elements))
    }

    fn write<S: OutputStream + ?Sized>(&self, write: &mut S) -> Result<()> {
        L::write_len(self.elements.len(), write)?;

        for element in &self.elements {
            element.write(write)?;
        }

        Ok(())
    }
}
