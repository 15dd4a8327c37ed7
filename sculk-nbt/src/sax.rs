//!
//! SAX-style reading of a single NBT compound.
//!
//! Instead of materializing a compound, [`sax_compound`] walks it once and routes each entry
//! through a caller-supplied action table. A dictionary function maps tag names to action
//! indices; entries that miss the dictionary, mismatch their expected type, or carry
//! over-length names are either decoded into an *ignored-tags* compound or skipped outright.
//!
//! Actions may declare prerequisites on other actions. An entry whose prerequisites have not yet
//! fired is remembered with a stream mark and replayed in later resolution passes once its
//! prerequisites are satisfied; entries whose prerequisites never resolve get their
//! `on_failed_resolve` callback, and actions that never appeared at all get `on_absent`. Exactly
//! one of the three callbacks runs per action, or none when the action fired no callback and has
//! no absent handler.
//!
//! The stream must support marks whose positions stay valid regardless of reset order, which
//! holds for buffer-backed streams such as [`sculk_stream::SliceInput`].

use crate::{codec, NbtCompound, NbtError, Result, TAG_END, TAG_LIST, TAG_LONG_ARRAY};
use alloc::vec;
use alloc::vec::Vec;
use sculk_protocol::utf::decode_utf8;
use sculk_protocol::ProtocolType;
use sculk_stream::{MarkableStream, StreamMark};

///
/// Tag names of this length or longer bypass the dictionary entirely and are treated as unknown.
pub const MAX_TAG_NAME: usize = 64;

///
/// The largest valid [`SaxAction::expected`] value.
pub const MAX_EXPECTED: usize = 25;

///
/// The `expected` value describing a typed list whose elements have the given payload ordinal.
#[must_use]
pub const fn typed_list(ordinal: u8) -> usize {
    13 + ordinal as usize
}

///
/// One entry in a SAX action table.
///
/// `expected` selects what the entry's tag must look like:
/// * `0..=12`: a payload of that ordinal; the list ordinal accepts any list. `on_present` runs
///   with the stream positioned at the start of the payload.
/// * `13..=25`: a list whose element ordinal is `expected - 13`. `on_present` runs with the
///   stream positioned at the list's length field, the element tag already consumed.
///
/// `D` is the caller's working data, threaded through every callback.
pub struct SaxAction<D> {
    ///
    /// The expected type, as described above. Values past [`MAX_EXPECTED`] are rejected by
    /// [`sax_compound`] before any reading happens.
    pub expected: usize,

    ///
    /// Runs when the entry is found with a matching type and all prerequisites have fired.
    pub on_present: fn(&mut dyn MarkableStream, &mut D) -> Result<()>,

    ///
    /// Indices of actions that must have fired before this one's `on_present` runs.
    pub prerequisites: &'static [usize],

    ///
    /// Runs after the pass if the entry never appeared (and `on_failed_resolve` did not run).
    pub on_absent: Option<fn(&mut D)>,

    ///
    /// Runs after the pass if the entry appeared but its prerequisites never resolved. The
    /// stream is reset to where `on_present` would have started.
    pub on_failed_resolve: Option<fn(&mut dyn MarkableStream, &mut D) -> Result<()>>,
}

impl<D> SaxAction<D> {
    ///
    /// Creates an action with no prerequisites and no absent/failed handlers.
    pub fn new(expected: usize, on_present: fn(&mut dyn MarkableStream, &mut D) -> Result<()>) -> Self {
        Self {
            expected,
            on_present,
            prerequisites: &[],
            on_absent: None,
            on_failed_resolve: None,
        }
    }

    ///
    /// Declares prerequisite action indices.
    #[must_use]
    pub fn with_prerequisites(mut self, prerequisites: &'static [usize]) -> Self {
        self.prerequisites = prerequisites;
        self
    }

    ///
    /// Attaches an absent handler.
    #[must_use]
    pub fn with_absent(mut self, on_absent: fn(&mut D)) -> Self {
        self.on_absent = Some(on_absent);
        self
    }

    ///
    /// Attaches a failed-resolve handler.
    #[must_use]
    pub fn with_failed_resolve(
        mut self,
        on_failed_resolve: fn(&mut dyn MarkableStream, &mut D) -> Result<()>,
    ) -> Self {
        self.on_failed_resolve = Some(on_failed_resolve);
        self
    }
}

///
/// Reads a compound in SAX style.
///
/// `stream` must be positioned just inside the compound (after its own tag and name, if any);
/// when this function returns successfully the stream is positioned right after the compound's
/// terminating zero tag, regardless of any deferred-mark rewinds that happened in between.
///
/// `dict` maps a raw (UTF-8) tag name to an action index; `None` or an out-of-range index means
/// the entry is unknown. Unknown and type-mismatched entries are decoded into `ignored` when one
/// is provided, otherwise skipped.
///
/// # Errors
/// Fails with [`NbtError::InvalidState`] if any action's `expected` exceeds [`MAX_EXPECTED`] or
/// names an out-of-range prerequisite; otherwise propagates tag, codec and stream errors, as
/// well as errors returned by the callbacks themselves.
pub fn sax_compound<D>(
    stream: &mut dyn MarkableStream,
    data: &mut D,
    dict: &dyn Fn(&[u8]) -> Option<usize>,
    actions: &[SaxAction<D>],
    mut ignored: Option<&mut NbtCompound>,
) -> Result<()> {
    for action in actions {
        if action.expected > MAX_EXPECTED {
            return Err(NbtError::InvalidState("sax action expected type out of range"));
        }

        if action.prerequisites.iter().any(|&p| p >= actions.len()) {
            return Err(NbtError::InvalidState("sax prerequisite index out of range"));
        }
    }

    let mut present = vec![false; actions.len()];
    let mut seen = vec![false; actions.len()];
    let mut deferred: Vec<(usize, StreamMark)> = Vec::new();

    loop {
        let tag = u8::read(stream)?;
        if tag == TAG_END {
            break;
        }

        if tag > TAG_LONG_ARRAY {
            return Err(NbtError::InvalidTag(tag));
        }

        let name_len = usize::from(u16::read(stream)?);

        // oversized names never reach the dictionary
        if name_len >= MAX_TAG_NAME {
            if ignored.is_some() {
                let mut name = vec![0_u8; name_len];
                stream.read_exact(&mut name)?;
                place_or_skip(stream, tag, &name, &mut ignored)?;
            } else {
                stream.skip(name_len)?;
                codec::skip_payload(stream, tag)?;
            }

            continue;
        }

        let mut name = [0_u8; MAX_TAG_NAME];
        let name = &mut name[..name_len];
        stream.read_exact(name)?;

        let Some(index) = dict(name).filter(|&index| index < actions.len()) else {
            place_or_skip(stream, tag, name, &mut ignored)?;
            continue;
        };

        // duplicate entries for an already-handled action count as unknown
        if present[index] || seen[index] {
            place_or_skip(stream, tag, name, &mut ignored)?;
            continue;
        }

        let action = &actions[index];

        if action.expected <= 12 {
            if usize::from(tag - 1) != action.expected {
                place_or_skip(stream, tag, name, &mut ignored)?;
                continue;
            }

            if satisfied(action.prerequisites, &present) {
                (action.on_present)(stream, data)?;
                present[index] = true;
            } else {
                let mark = stream.mark();
                seen[index] = true;
                deferred.push((index, mark));
                codec::skip_payload(stream, tag)?;
            }
        } else {
            // typed list: the element tag must match expected - 13
            if tag != TAG_LIST {
                place_or_skip(stream, tag, name, &mut ignored)?;
                continue;
            }

            let list_mark = stream.mark();
            let elem_tag = u8::read(stream)?;
            if elem_tag > TAG_LONG_ARRAY {
                return Err(NbtError::InvalidTag(elem_tag));
            }

            let matches = elem_tag != TAG_END && usize::from(elem_tag - 1) == action.expected - 13;
            if !matches {
                // rewind over the element tag so the whole list can be placed or skipped
                stream.reset(&list_mark)?;
                place_or_skip(stream, tag, name, &mut ignored)?;
                continue;
            }

            if satisfied(action.prerequisites, &present) {
                (action.on_present)(stream, data)?;
                present[index] = true;
            } else {
                let mark = stream.mark();
                seen[index] = true;
                deferred.push((index, mark));
                codec::skip_list_body_at(stream, elem_tag, 0)?;
            }
        }
    }

    let end_mark = stream.mark();

    // bounded re-resolution: each pass can fire at least one deferred entry, so the number of
    // passes never exceeds the number of entries
    let max_pass = deferred.len();
    for _ in 0..max_pass {
        if deferred.is_empty() {
            break;
        }

        let mut progressed = false;
        let mut remaining = Vec::with_capacity(deferred.len());

        for (index, mark) in deferred.drain(..) {
            if satisfied(actions[index].prerequisites, &present) {
                stream.reset(&mark)?;
                (actions[index].on_present)(stream, data)?;
                present[index] = true;
                progressed = true;
            } else {
                remaining.push((index, mark));
            }
        }

        deferred = remaining;
        if !progressed {
            break;
        }
    }

    let mut failed = vec![false; actions.len()];
    for (index, mark) in &deferred {
        if let Some(on_failed_resolve) = actions[*index].on_failed_resolve {
            stream.reset(mark)?;
            on_failed_resolve(stream, data)?;
            failed[*index] = true;
        }
    }

    for (index, action) in actions.iter().enumerate() {
        if !present[index] && !failed[index] {
            if let Some(on_absent) = action.on_absent {
                on_absent(data);
            }
        }
    }

    stream.reset(&end_mark)?;
    Ok(())
}

fn satisfied(prerequisites: &[usize], present: &[bool]) -> bool {
    prerequisites.iter().all(|&p| present[p])
}

fn place_or_skip(
    stream: &mut dyn MarkableStream,
    tag: u8,
    name: &[u8],
    ignored: &mut Option<&mut NbtCompound>,
) -> Result<()> {
    match ignored {
        Some(compound) => {
            let name = decode_utf8(name)?.string;
            let payload = codec::read_payload(stream, tag)?;
            compound.insert(name, payload);
            Ok(())
        }
        None => codec::skip_payload(stream, tag),
    }
}

#[cfg(test)]
mod tests {
    use crate::sax::{sax_compound, typed_list, SaxAction};
    use crate::{codec, NbtCompound, NbtElement, NbtList, Result};
    use alloc::string::String;
    use alloc::vec;
    use alloc::vec::Vec;
    use sculk_stream::{MarkableStream, SliceInput};

    #[derive(Default)]
    struct Data {
        order: Vec<char>,
        a: i32,
        b: i32,
        bytes: Vec<i8>,
        absent: bool,
        failed: bool,
    }

    fn dict(name: &[u8]) -> Option<usize> {
        match name {
            b"a" => Some(0),
            b"b" => Some(1),
            _ => None,
        }
    }

    fn read_a(stream: &mut dyn MarkableStream, data: &mut Data) -> Result<()> {
        data.a = i32::read_payload(stream)?;
        data.order.push('a');
        Ok(())
    }

    fn read_b(stream: &mut dyn MarkableStream, data: &mut Data) -> Result<()> {
        data.b = i32::read_payload(stream)?;
        data.order.push('b');
        Ok(())
    }

    fn compound_bytes(entries: &NbtCompound) -> Vec<u8> {
        let mut bytes = Vec::new();
        codec::write_compound(&mut bytes, entries).unwrap();
        bytes
    }

    #[test]
    fn prerequisite_defers_until_second_pass() {
        // item order matters here, so the bytes are written by hand: b first, then a
        let mut bytes = Vec::new();
        codec::write_item(&mut bytes, "b", &crate::NbtPayload::Int(2)).unwrap();
        codec::write_item(&mut bytes, "a", &crate::NbtPayload::Int(1)).unwrap();
        bytes.push(0);
        bytes.push(0xEE); // sentinel after the compound

        let actions = [
            SaxAction::new(2, read_a),
            SaxAction::new(2, read_b).with_prerequisites(&[0]),
        ];

        let mut data = Data::default();
        let mut stream = SliceInput::new(&bytes);
        sax_compound(&mut stream, &mut data, &dict, &actions, None).unwrap();

        assert_eq!(vec!['a', 'b'], data.order);
        assert_eq!(1, data.a);
        assert_eq!(2, data.b);

        // the stream ends up just past the compound terminator
        assert_eq!(1, stream.remaining());
    }

    #[test]
    fn in_order_entries_fire_immediately() {
        let mut compound = NbtCompound::new();
        compound.insert("a", 7_i32);
        let bytes = compound_bytes(&compound);

        let actions = [SaxAction::new(2, read_a)];

        let mut data = Data::default();
        sax_compound(
            &mut SliceInput::new(&bytes),
            &mut data,
            &dict,
            &actions,
            None,
        )
        .unwrap();

        assert_eq!(7, data.a);
    }

    #[test]
    fn unknown_entries_land_in_ignored_compound() {
        let mut compound = NbtCompound::new();
        compound.insert("mystery", String::from("hello"));
        compound.insert("a", 3_i32);
        let bytes = compound_bytes(&compound);

        let actions = [SaxAction::new(2, read_a)];

        let mut data = Data::default();
        let mut ignored = NbtCompound::new();
        sax_compound(
            &mut SliceInput::new(&bytes),
            &mut data,
            &dict,
            &actions,
            Some(&mut ignored),
        )
        .unwrap();

        assert_eq!(3, data.a);
        assert_eq!(1, ignored.len());
        assert_eq!(
            Some(&String::from("hello")),
            ignored.get_as::<String>("mystery")
        );
    }

    #[test]
    fn type_mismatch_is_placed_not_fired() {
        let mut compound = NbtCompound::new();
        compound.insert("a", 1.5_f64); // action 0 expects Int
        let bytes = compound_bytes(&compound);

        let actions = [SaxAction::new(2, read_a).with_absent(|data| data.absent = true)];

        let mut data = Data::default();
        let mut ignored = NbtCompound::new();
        sax_compound(
            &mut SliceInput::new(&bytes),
            &mut data,
            &dict,
            &actions,
            Some(&mut ignored),
        )
        .unwrap();

        assert_eq!(0, data.a);
        assert!(data.absent);
        assert_eq!(Some(&1.5), ignored.get_as::<f64>("a"));
    }

    #[test]
    fn typed_list_match_and_mismatch() {
        fn read_bytes(stream: &mut dyn MarkableStream, data: &mut Data) -> Result<()> {
            // positioned at the length field
            let len = i32::read_payload(stream)?;
            for _ in 0..len {
                let value = i8::read_payload(stream)?;
                data.bytes.push(value);
            }
            Ok(())
        }

        fn list_dict(name: &[u8]) -> Option<usize> {
            (name == b"l").then_some(0)
        }

        let actions = [SaxAction::new(typed_list(0), read_bytes)];

        // matching list of bytes
        let mut compound = NbtCompound::new();
        compound.insert("l", NbtList::from(vec![1_i8, 2, 3]));
        let bytes = compound_bytes(&compound);

        let mut data = Data::default();
        sax_compound(
            &mut SliceInput::new(&bytes),
            &mut data,
            &list_dict,
            &actions,
            None,
        )
        .unwrap();
        assert_eq!(vec![1, 2, 3], data.bytes);

        // list of ints does not match; it lands in the ignored compound intact
        let mut compound = NbtCompound::new();
        compound.insert("l", NbtList::from(vec![9_i32]));
        let bytes = compound_bytes(&compound);

        let mut data = Data::default();
        let mut ignored = NbtCompound::new();
        sax_compound(
            &mut SliceInput::new(&bytes),
            &mut data,
            &list_dict,
            &actions,
            Some(&mut ignored),
        )
        .unwrap();

        assert!(data.bytes.is_empty());
        let placed = ignored.get_as::<NbtList>("l").unwrap();
        assert_eq!(&[9], placed.elements::<i32>().unwrap());
    }

    #[test]
    fn unresolvable_prerequisite_fails_resolve() {
        // b is present but depends on a, which never appears
        let mut compound = NbtCompound::new();
        compound.insert("b", 5_i32);
        let bytes = compound_bytes(&compound);

        let actions = [
            SaxAction::new(2, read_a).with_absent(|data| data.absent = true),
            SaxAction::new(2, read_b)
                .with_prerequisites(&[0])
                .with_failed_resolve(|stream, data| {
                    // the stream is back at b's payload
                    data.b = i32::read_payload(stream)?;
                    data.failed = true;
                    Ok(())
                })
                .with_absent(|data| data.order.push('!')),
        ];

        let mut data = Data::default();
        let mut stream = SliceInput::new(&bytes);
        sax_compound(&mut stream, &mut data, &dict, &actions, None).unwrap();

        assert!(data.absent); // a: absent handler
        assert!(data.failed); // b: failed-resolve handler
        assert_eq!(5, data.b);
        assert!(data.order.is_empty()); // b's absent handler must not also run
        assert_eq!(0, stream.remaining()); // position ends at the compound end
    }

    #[test]
    fn long_names_bypass_the_dictionary() {
        let long_name: String = core::iter::repeat('x').take(70).collect();

        let mut compound = NbtCompound::new();
        compound.insert(long_name.clone(), 9_i32);
        let bytes = compound_bytes(&compound);

        // a dictionary that would match anything, to prove it is bypassed
        fn greedy(_name: &[u8]) -> Option<usize> {
            Some(0)
        }

        let actions = [SaxAction::new(2, read_a)];

        let mut data = Data::default();
        let mut ignored = NbtCompound::new();
        sax_compound(
            &mut SliceInput::new(&bytes),
            &mut data,
            &greedy,
            &actions,
            Some(&mut ignored),
        )
        .unwrap();

        assert_eq!(0, data.a);
        assert_eq!(Some(&9), ignored.get_as::<i32>(long_name.as_str()));
    }

    #[test]
    fn duplicate_entries_fire_once() {
        let mut bytes = Vec::new();
        codec::write_item(&mut bytes, "a", &crate::NbtPayload::Int(1)).unwrap();
        codec::write_item(&mut bytes, "a", &crate::NbtPayload::Int(2)).unwrap();
        bytes.push(0);

        let actions = [SaxAction::new(2, read_a)];

        let mut data = Data::default();
        sax_compound(
            &mut SliceInput::new(&bytes),
            &mut data,
            &dict,
            &actions,
            None,
        )
        .unwrap();

        assert_eq!(1, data.a);
        assert_eq!(vec!['a'], data.order);
    }

    #[test]
    fn out_of_range_expected_rejected() {
        let actions = [SaxAction::new(26, read_a)];

        let mut data = Data::default();
        let result = sax_compound(
            &mut SliceInput::new(&[0]),
            &mut data,
            &dict,
            &actions,
            None,
        );

        assert!(matches!(result, Err(crate::NbtError::InvalidState(_))));
    }
}
