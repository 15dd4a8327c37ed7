//!
//! Reading, writing and skipping of tagged NBT values.
//!
//! On the wire an *item* is `tag(u8)`, then (unless the tag is [`TAG_END`]) a length-prefixed
//! UTF-8 name and a payload whose shape depends on the tag. A *compound* is a sequence of items
//! terminated by a zero tag; a *list* is `elem_tag(u8) length(i32be)` followed by that many
//! payloads of the element type.
//!
//! The skipper advances over a payload without materializing it: fixed-width payloads skip their
//! width, counted arrays skip `length * stride`, and only shapes with per-element sizes (string
//! lists, nested containers) are walked element by element.

use crate::{
    NbtCompound, NbtElement, NbtError, NbtList, NbtPayload, Result, DEPTH_LIMIT, TAG_BYTE,
    TAG_BYTE_ARRAY, TAG_COMPOUND, TAG_DOUBLE, TAG_END, TAG_FLOAT, TAG_INT, TAG_INT_ARRAY,
    TAG_LIST, TAG_LONG, TAG_LONG_ARRAY, TAG_SHORT, TAG_STRING,
};
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use sculk_protocol::types::JavaString;
use sculk_protocol::{codec_error, ProtocolType};
use sculk_stream::{InputStream, OutputStream};

///
/// Reads one item: a tag byte, and for non-end tags a name and payload.
///
/// Yields `None` for the end-of-compound marker (tag zero), which carries neither name nor
/// payload.
///
/// # Errors
/// Returns `Err` on an out-of-range tag, malformed payload bytes, or stream failure.
pub fn read_item<S: InputStream + ?Sized>(read: &mut S) -> Result<Option<(String, NbtPayload)>> {
    let tag = u8::read(read)?;
    if tag == TAG_END {
        return Ok(None);
    }

    if tag > TAG_LONG_ARRAY {
        return Err(NbtError::InvalidTag(tag));
    }

    let name = read_java_string(read)?;
    let payload = read_payload_at(read, tag, 0)?;
    Ok(Some((name, payload)))
}

///
/// Writes one item: tag byte, name, payload.
///
/// # Errors
/// Returns `Err` if a length cap is exceeded or the stream refuses bytes.
pub fn write_item<S: OutputStream + ?Sized>(
    write: &mut S,
    name: &str,
    payload: &NbtPayload,
) -> Result<()> {
    payload.tag().write(write)?;
    write_java_string(name, write)?;
    write_payload(write, payload)
}

///
/// Reads the payload for the given tag. The stream must be positioned at the payload, after the
/// tag and name.
///
/// # Errors
/// Fails with [`NbtError::InvalidTag`] when `tag` is zero or out of range, and otherwise on
/// malformed bytes or stream failure.
pub fn read_payload<S: InputStream + ?Sized>(read: &mut S, tag: u8) -> Result<NbtPayload> {
    read_payload_at(read, tag, 0)
}

pub(crate) fn read_payload_at<S: InputStream + ?Sized>(
    read: &mut S,
    tag: u8,
    depth: usize,
) -> Result<NbtPayload> {
    if tag == TAG_END {
        return Err(NbtError::InvalidTag(tag));
    }

    with_element_type!(usize::from(tag - 1), T => {
        <T as NbtElement>::read_payload_at(read, depth).map(NbtElement::into_payload)
    }, Err(NbtError::InvalidTag(tag)))
}

///
/// Writes a payload, without any tag or name.
///
/// # Errors
/// Returns `Err` if a length cap is exceeded or the stream refuses bytes.
pub fn write_payload<S: OutputStream + ?Sized>(write: &mut S, payload: &NbtPayload) -> Result<()> {
    match payload {
        NbtPayload::Byte(value) => value.write_payload(write),
        NbtPayload::Short(value) => value.write_payload(write),
        NbtPayload::Int(value) => value.write_payload(write),
        NbtPayload::Long(value) => value.write_payload(write),
        NbtPayload::Float(value) => value.write_payload(write),
        NbtPayload::Double(value) => value.write_payload(write),
        NbtPayload::ByteArray(value) => value.write_payload(write),
        NbtPayload::String(value) => value.write_payload(write),
        NbtPayload::List(value) => value.write_payload(write),
        NbtPayload::Compound(value) => value.write_payload(write),
        NbtPayload::IntArray(value) => value.write_payload(write),
        NbtPayload::LongArray(value) => value.write_payload(write),
    }
}

///
/// Reads a compound payload: items up to and including the zero terminator. The stream must be
/// positioned after the compound's own tag and name.
///
/// # Errors
/// Returns `Err` on malformed contents or stream failure.
pub fn read_compound<S: InputStream + ?Sized>(read: &mut S) -> Result<NbtCompound> {
    read_compound_at(read, 0)
}

pub(crate) fn read_compound_at<S: InputStream + ?Sized>(
    read: &mut S,
    depth: usize,
) -> Result<NbtCompound> {
    if depth >= DEPTH_LIMIT {
        return Err(NbtError::DepthLimitExceeded);
    }

    let mut compound = NbtCompound::new();
    loop {
        let tag = u8::read(read)?;
        if tag == TAG_END {
            return Ok(compound);
        }

        if tag > TAG_LONG_ARRAY {
            return Err(NbtError::InvalidTag(tag));
        }

        let name = read_java_string(read)?;
        let payload = read_payload_at(read, tag, depth + 1)?;
        compound.insert(name, payload);
    }
}

///
/// Writes a compound payload: every item in unspecified order, then the zero terminator.
///
/// # Errors
/// Returns `Err` if a length cap is exceeded or the stream refuses bytes.
pub fn write_compound<S: OutputStream + ?Sized>(
    write: &mut S,
    compound: &NbtCompound,
) -> Result<()> {
    for (name, payload) in compound {
        write_item(write, name, payload)?;
    }

    TAG_END.write(write)?;
    Ok(())
}

///
/// Reads a list payload: element tag, `i32` length, then the elements. The stream must be
/// positioned after the list's own tag and name.
///
/// A zero element tag is only valid with length zero and produces the sentinel empty list.
///
/// # Errors
/// Returns `Err` on an out-of-range element tag, a negative length, a non-empty `TAG_End` list,
/// malformed elements, or stream failure.
pub fn read_list<S: InputStream + ?Sized>(read: &mut S) -> Result<NbtList> {
    read_list_at(read, 0)
}

pub(crate) fn read_list_at<S: InputStream + ?Sized>(read: &mut S, depth: usize) -> Result<NbtList> {
    if depth >= DEPTH_LIMIT {
        return Err(NbtError::DepthLimitExceeded);
    }

    let elem_tag = u8::read(read)?;
    if elem_tag > TAG_LONG_ARRAY {
        return Err(NbtError::InvalidTag(elem_tag));
    }

    let len = read_array_len(read)?;

    if elem_tag == TAG_END {
        if len != 0 {
            return Err(NbtError::NonEmptyEndList);
        }

        return Ok(NbtList::new());
    }

    with_element_type!(usize::from(elem_tag - 1), T => {
        let mut elements: Vec<T> = Vec::with_capacity(len);
        for _ in 0..len {
            elements.push(<T as NbtElement>::read_payload_at(read, depth + 1)?);
        }

        Ok(NbtList::from(elements))
    }, Err(NbtError::InvalidTag(elem_tag)))
}

///
/// Writes a list payload: element tag, length, elements.
///
/// # Errors
/// Returns `Err` if a length cap is exceeded or the stream refuses bytes.
pub fn write_list<S: OutputStream + ?Sized>(write: &mut S, list: &NbtList) -> Result<()> {
    list.element_tag().write(write)?;
    write_array_len(list.len(), write)?;
    list.write_elements(write)
}

///
/// Skips the payload for the given tag without materializing it. The stream must be positioned
/// at the payload.
///
/// A zero tag has no payload and skips nothing.
///
/// # Errors
/// Returns `Err` on an out-of-range tag, malformed framing inside the payload, or stream
/// failure.
pub fn skip_payload<S: InputStream + ?Sized>(read: &mut S, tag: u8) -> Result<()> {
    skip_payload_at(read, tag, 0)
}

pub(crate) fn skip_payload_at<S: InputStream + ?Sized>(
    read: &mut S,
    tag: u8,
    depth: usize,
) -> Result<()> {
    match tag {
        TAG_END => Ok(()),
        TAG_BYTE => Ok(read.skip(1)?),
        TAG_SHORT => Ok(read.skip(2)?),
        TAG_INT | TAG_FLOAT => Ok(read.skip(4)?),
        TAG_LONG | TAG_DOUBLE => Ok(read.skip(8)?),
        TAG_BYTE_ARRAY => {
            let len = read_array_len(read)?;
            Ok(read.skip(len)?)
        }
        TAG_STRING => {
            let len = usize::from(u16::read(read)?);
            Ok(read.skip(len)?)
        }
        TAG_LIST => {
            if depth >= DEPTH_LIMIT {
                return Err(NbtError::DepthLimitExceeded);
            }

            let elem_tag = u8::read(read)?;
            skip_list_body_at(read, elem_tag, depth)
        }
        TAG_COMPOUND => {
            if depth >= DEPTH_LIMIT {
                return Err(NbtError::DepthLimitExceeded);
            }

            loop {
                let tag = u8::read(read)?;
                if tag == TAG_END {
                    return Ok(());
                }

                let name_len = usize::from(u16::read(read)?);
                read.skip(name_len)?;
                skip_payload_at(read, tag, depth + 1)?;
            }
        }
        TAG_INT_ARRAY => {
            let len = read_array_len(read)?;
            Ok(read.skip(len.saturating_mul(4))?)
        }
        TAG_LONG_ARRAY => {
            let len = read_array_len(read)?;
            Ok(read.skip(len.saturating_mul(8))?)
        }
        _ => Err(NbtError::InvalidTag(tag)),
    }
}

// Skips a list payload whose element tag has already been consumed; the stream is at the length
// field. Lists of fixed-width elements skip in one stride; everything else goes element by
// element.
pub(crate) fn skip_list_body_at<S: InputStream + ?Sized>(
    read: &mut S,
    elem_tag: u8,
    depth: usize,
) -> Result<()> {
    if elem_tag > TAG_LONG_ARRAY {
        return Err(NbtError::InvalidTag(elem_tag));
    }

    let len = read_array_len(read)?;

    if elem_tag == TAG_END {
        if len != 0 {
            return Err(NbtError::NonEmptyEndList);
        }

        return Ok(());
    }

    let stride = match elem_tag {
        TAG_BYTE => Some(1),
        TAG_SHORT => Some(2),
        TAG_INT | TAG_FLOAT => Some(4),
        TAG_LONG | TAG_DOUBLE => Some(8),
        _ => None,
    };

    match stride {
        Some(stride) => Ok(read.skip(len.saturating_mul(stride))?),
        None => {
            for _ in 0..len {
                skip_payload_at(read, elem_tag, depth + 1)?;
            }

            Ok(())
        }
    }
}

pub(crate) fn read_java_string<S: InputStream + ?Sized>(read: &mut S) -> Result<String> {
    Ok(JavaString::read(read)?.into_string())
}

pub(crate) fn write_java_string<S: OutputStream + ?Sized>(value: &str, write: &mut S) -> Result<()> {
    let bytes = value.as_bytes();
    let Ok(byte_len) = u16::try_from(bytes.len()) else {
        return Err(codec_error!(*TooLong "string byte length exceeds the u16 prefix range").into());
    };

    byte_len.write(write)?;
    write.write_all(bytes)?;
    Ok(())
}

pub(crate) fn read_byte_array<S: InputStream + ?Sized>(read: &mut S) -> Result<Vec<i8>> {
    let len = read_array_len(read)?;

    let mut bytes = vec![0_u8; len];
    read.read_exact(&mut bytes)?;

    let mut bytes = core::mem::ManuallyDrop::new(bytes);

    // SAFETY:
    // - i8 and u8 have identical size and alignment
    // - the pointer, length and capacity come from a live Vec<u8> that is never dropped
    let signed =
        unsafe { Vec::from_raw_parts(bytes.as_mut_ptr().cast::<i8>(), bytes.len(), bytes.capacity()) };

    Ok(signed)
}

pub(crate) fn write_byte_array<S: OutputStream + ?Sized>(
    value: &[i8],
    write: &mut S,
) -> Result<()> {
    write_array_len(value.len(), write)?;

    // SAFETY:
    // - i8 and u8 have identical size and alignment
    // - the slice borrow keeps the data alive for the duration of the call
    let bytes = unsafe { core::slice::from_raw_parts(value.as_ptr().cast::<u8>(), value.len()) };

    write.write_all(bytes)?;
    Ok(())
}

pub(crate) fn read_num_array<T, S>(read: &mut S) -> Result<Vec<T>>
where
    T: ProtocolType,
    S: InputStream + ?Sized,
{
    let len = read_array_len(read)?;

    let mut elements = Vec::with_capacity(len);
    for _ in 0..len {
        elements.push(T::read(read)?);
    }

    Ok(elements)
}

pub(crate) fn write_num_array<T, S>(value: &[T], write: &mut S) -> Result<()>
where
    T: ProtocolType,
    S: OutputStream + ?Sized,
{
    write_array_len(value.len(), write)?;

    for element in value {
        element.write(write)?;
    }

    Ok(())
}

fn read_array_len<S: InputStream + ?Sized>(read: &mut S) -> Result<usize> {
    let len = i32::read(read)?;
    usize::try_from(len)
        .map_err(|_| codec_error!(*Malformed "negative nbt length prefix").into())
}

fn write_array_len<S: OutputStream + ?Sized>(len: usize, write: &mut S) -> Result<()> {
    let Ok(len) = i32::try_from(len) else {
        return Err(codec_error!(*TooLong "length exceeds the i32 prefix range").into());
    };

    len.write(write)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::codec::{
        read_compound, read_item, read_list, skip_payload, write_compound, write_item,
    };
    use crate::{NbtCompound, NbtList, NbtPayload, TAG_COMPOUND, TAG_LIST};
    use alloc::string::String;
    use alloc::vec;
    use alloc::vec::Vec;
    use sculk_stream::SliceInput;

    // { "n": Short(42), "l": List<Byte>[1, 2, 3] }
    const COMPOUND_BYTES: &[u8] = &[
        0x02, 0x00, 0x01, 0x6E, 0x00, 0x2A, // Short "n" = 42
        0x09, 0x00, 0x01, 0x6C, 0x01, 0x00, 0x00, 0x00, 0x03, 0x01, 0x02, 0x03, // List "l"
        0x00, // end
    ];

    #[test]
    fn compound_decodes() {
        let compound = read_compound(&mut SliceInput::new(COMPOUND_BYTES)).unwrap();

        assert_eq!(2, compound.len());
        assert_eq!(Some(&42), compound.get_as::<i16>("n"));

        let list = compound.get_as::<NbtList>("l").unwrap();
        assert_eq!(&[1, 2, 3], list.elements::<i8>().unwrap());
    }

    #[test]
    fn compound_round_trips() {
        let compound = read_compound(&mut SliceInput::new(COMPOUND_BYTES)).unwrap();

        let mut bytes = Vec::new();
        write_compound(&mut bytes, &compound).unwrap();

        // entry order on the wire is unspecified, so compare decoded forms
        let again = read_compound(&mut SliceInput::new(&bytes)).unwrap();
        assert_eq!(compound, again);
    }

    #[test]
    fn item_round_trip() {
        let payload = NbtPayload::IntArray(vec![1, -2, 3]);

        let mut bytes = Vec::new();
        write_item(&mut bytes, "ints", &payload).unwrap();

        let (name, decoded) = read_item(&mut SliceInput::new(&bytes)).unwrap().unwrap();
        assert_eq!("ints", name);
        assert_eq!(payload, decoded);
    }

    #[test]
    fn end_marker_is_none() {
        assert_eq!(None, read_item(&mut SliceInput::new(&[0x00])).unwrap());
    }

    #[test]
    fn invalid_tag_rejected() {
        let bytes = [0x0D, 0x00, 0x01, 0x61, 0x00];
        assert!(read_item(&mut SliceInput::new(&bytes)).is_err());
    }

    #[test]
    fn empty_list_needs_zero_length() {
        // elem tag 0, length 1
        let bytes = [0x00, 0x00, 0x00, 0x00, 0x01];
        assert!(read_list(&mut SliceInput::new(&bytes)).is_err());

        let bytes = [0x00, 0x00, 0x00, 0x00, 0x00];
        let list = read_list(&mut SliceInput::new(&bytes)).unwrap();
        assert_eq!(None, list.ordinal());
    }

    #[test]
    fn typed_empty_list_keeps_ordinal() {
        // elem tag Int, length 0
        let bytes = [0x03, 0x00, 0x00, 0x00, 0x00];
        let list = read_list(&mut SliceInput::new(&bytes)).unwrap();
        assert_eq!(Some(2), list.ordinal());
        assert!(list.is_empty());
    }

    #[test]
    fn negative_list_length_rejected() {
        let bytes = [0x01, 0xFF, 0xFF, 0xFF, 0xFF];
        assert!(read_list(&mut SliceInput::new(&bytes)).is_err());
    }

    #[test]
    fn nested_round_trip() {
        let mut inner = NbtCompound::new();
        inner.insert("x", 1.5_f64);
        inner.insert("s", String::from("hello"));

        let mut root = NbtCompound::new();
        root.insert("inner", inner);
        root.insert("bytes", vec![1_i8, -1]);
        root.insert(
            "lists",
            NbtList::from(vec![NbtList::from(vec![1_i32]), NbtList::new()]),
        );

        let mut bytes = Vec::new();
        write_compound(&mut bytes, &root).unwrap();

        let decoded = read_compound(&mut SliceInput::new(&bytes)).unwrap();
        assert_eq!(root, decoded);
    }

    #[test]
    fn skip_covers_whole_payload() {
        let mut compound = NbtCompound::new();
        compound.insert("a", 1_i8);
        compound.insert("big", vec![0_i64; 10]);
        compound.insert("strs", NbtList::from(vec![String::from("x"), String::from("y")]));

        let mut bytes = Vec::new();
        write_compound(&mut bytes, &compound).unwrap();
        bytes.push(0xAA); // trailing sentinel byte

        let mut stream = SliceInput::new(&bytes);
        skip_payload(&mut stream, TAG_COMPOUND).unwrap();
        assert_eq!(1, stream.remaining());
    }

    #[test]
    fn skip_list_of_primitives() {
        let list = NbtList::from(vec![1_i32, 2, 3]);

        let mut bytes = Vec::new();
        crate::codec::write_list(&mut bytes, &list).unwrap();

        let mut stream = SliceInput::new(&bytes);
        skip_payload(&mut stream, TAG_LIST).unwrap();
        assert_eq!(0, stream.remaining());
    }

    #[test]
    fn depth_limit_enforced() {
        // a compound nested past DEPTH_LIMIT: repeated `0A 0000` with no terminators
        let mut bytes = Vec::new();
        for _ in 0..=crate::DEPTH_LIMIT {
            bytes.push(0x0A);
            bytes.extend_from_slice(&[0x00, 0x01, 0x63]); // name "c"
        }

        assert!(matches!(
            read_compound(&mut SliceInput::new(&bytes)),
            Err(crate::NbtError::DepthLimitExceeded)
        ));
    }
}
