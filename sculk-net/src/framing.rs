//!
//! The per-connection packet framing state machine.
//!
//! Packets arrive as a `VarInt` length followed by that many body bytes. The reader consumes the
//! length one byte at a time (states `Len0..Len4`), then collects the body: small bodies go
//! through a stack buffer, large or partially received ones spill to a heap buffer that
//! survives across would-block boundaries. A completed body is handed to the packet callback as
//! a bounded [`SliceInput`], after which the machine resets for the next length byte.
//!
//! Zero-length packets, lengths above the configured maximum, and length prefixes with a
//! continuation bit in the fifth byte are all fatal for the connection.

use sculk_protocol::CodecError;
use sculk_stream::SliceInput;
use std::io::{self, Read};
use std::mem;
use std::net::TcpStream;

///
/// Bodies up to this size are read into a stack buffer when no partial body is pending.
pub const STACK_BUFFER: usize = 8192;

///
/// The byte source consumed by [`FrameReader::pump`]. Mirrors a non-blocking `read`.
pub trait InSource {
    ///
    /// Reads into `buf`, returning the number of bytes transferred. `Ok(0)` means the peer
    /// closed the stream.
    ///
    /// # Errors
    /// `WouldBlock` signals that no data is available right now.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

///
/// [`InSource`] over a non-blocking `TcpStream`.
pub struct SocketSource<'a>(pub &'a TcpStream);

impl InSource for SocketSource<'_> {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut stream = self.0;
        stream.read(buf)
    }
}

///
/// What a call to [`FrameReader::pump`] accomplished.
#[derive(Debug)]
pub enum ReadOutcome {
    ///
    /// One complete packet was delivered to the callback. The descriptor should yield with
    /// `More` so queued work runs before the next read.
    Frame,

    ///
    /// No complete packet yet; wait for the next readability event.
    WouldBlock,

    ///
    /// The peer closed the stream, or the framing was violated (zero or oversized length,
    /// overlong prefix). The connection should shut down.
    Closed,

    ///
    /// The packet callback itself failed; the read half should be closed.
    Failed(CodecError),
}

#[derive(Copy, Clone)]
enum State {
    // reading the (i+1)-th byte of the length prefix
    Len(u8),
    Overflow,
    Data,
}

///
/// The framing state machine. See the module documentation.
pub struct FrameReader {
    state: State,
    packet_size: usize,
    read_size: usize,
    max_packet_size: usize,
    inbound: Vec<u8>,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    ///
    /// Creates a reader with no packet size restriction.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::Len(0),
            packet_size: 0,
            read_size: 0,
            max_packet_size: 0,
            inbound: Vec::new(),
        }
    }

    ///
    /// Restricts the accepted packet size. Zero disables the check. A restriction guards
    /// against length prefixes crafted to make the server allocate huge buffers.
    pub fn set_max_packet_size(&mut self, max: usize) {
        self.max_packet_size = max;
    }

    ///
    /// The current packet size restriction; zero means unrestricted.
    #[must_use]
    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    ///
    /// Advances the state machine until one packet completes, the source would block, or the
    /// stream dies. At most one packet is delivered per call.
    ///
    /// # Errors
    /// Propagates fatal source errors. Callback failures and framing violations are reported
    /// through [`ReadOutcome`] instead, since they affect only this connection's lifecycle.
    pub fn pump<S, F>(&mut self, source: &mut S, on_packet: F) -> io::Result<ReadOutcome>
    where
        S: InSource + ?Sized,
        F: FnOnce(&mut SliceInput<'_>) -> Result<(), CodecError>,
    {
        loop {
            match self.state {
                State::Overflow => return Ok(ReadOutcome::Closed),

                State::Len(i) => {
                    let mut byte = [0_u8; 1];
                    match source.recv(&mut byte) {
                        Ok(0) => return Ok(ReadOutcome::Closed),
                        Ok(_) => {
                            self.packet_size |= usize::from(byte[0] & 0x7F) << (7 * u32::from(i));

                            if byte[0] & 0x80 == 0 {
                                let too_large = self.max_packet_size > 0
                                    && self.packet_size > self.max_packet_size;

                                if self.packet_size == 0 || too_large {
                                    self.state = State::Overflow;
                                    return Ok(ReadOutcome::Closed);
                                }

                                self.read_size = 0;
                                self.state = State::Data;
                            } else if i == 4 {
                                self.state = State::Overflow;
                                return Ok(ReadOutcome::Closed);
                            } else {
                                self.state = State::Len(i + 1);
                            }
                        }
                        Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                            return Ok(ReadOutcome::WouldBlock);
                        }
                        Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                        Err(error) => return Err(error),
                    }
                }

                State::Data => {
                    let mut stack = [0_u8; STACK_BUFFER];
                    let mut inbound = mem::take(&mut self.inbound);

                    // a pending partial body is always in the heap buffer
                    let use_heap = !inbound.is_empty() || self.packet_size > STACK_BUFFER;
                    if use_heap && inbound.len() < self.packet_size {
                        inbound.resize(self.packet_size, 0);
                    }

                    let target: &mut [u8] = if use_heap {
                        &mut inbound[..self.packet_size]
                    } else {
                        &mut stack[..self.packet_size]
                    };

                    enum Data {
                        Complete,
                        Blocked,
                        Closed,
                        Fatal(io::Error),
                    }

                    let outcome = loop {
                        match source.recv(&mut target[self.read_size..]) {
                            Ok(0) => break Data::Closed,
                            Ok(n) => {
                                self.read_size += n;
                                if self.read_size == self.packet_size {
                                    break Data::Complete;
                                }
                            }
                            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                                break Data::Blocked;
                            }
                            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                            Err(error) => break Data::Fatal(error),
                        }
                    };

                    match outcome {
                        Data::Complete => {
                            let mut input = SliceInput::new(&target[..self.packet_size]);
                            let result = on_packet(&mut input);

                            self.packet_size = 0;
                            self.read_size = 0;
                            self.state = State::Len(0);

                            return match result {
                                Ok(()) => Ok(ReadOutcome::Frame),
                                Err(error) => Ok(ReadOutcome::Failed(error)),
                            };
                        }
                        Data::Blocked => {
                            if !use_heap && self.read_size > 0 {
                                // preserve the partial body across the block
                                inbound.resize(self.packet_size, 0);
                                inbound[..self.read_size].copy_from_slice(&stack[..self.read_size]);
                            }

                            self.inbound = inbound;
                            return Ok(ReadOutcome::WouldBlock);
                        }
                        Data::Closed => return Ok(ReadOutcome::Closed),
                        Data::Fatal(error) => return Err(error),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::framing::{FrameReader, InSource, ReadOutcome, STACK_BUFFER};
    use sculk_stream::InputStream;
    use std::collections::VecDeque;
    use std::io;

    // Serves scripted chunks; a `None` entry reports WouldBlock once.
    struct ScriptedSource {
        chunks: VecDeque<Option<Vec<u8>>>,
        closed_at_end: bool,
    }

    impl ScriptedSource {
        fn new(chunks: Vec<Option<Vec<u8>>>) -> Self {
            Self {
                chunks: chunks.into(),
                closed_at_end: false,
            }
        }
    }

    impl InSource for ScriptedSource {
        fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.front_mut() {
                None => {
                    if self.closed_at_end {
                        Ok(0)
                    } else {
                        Err(io::ErrorKind::WouldBlock.into())
                    }
                }
                Some(None) => {
                    self.chunks.pop_front();
                    Err(io::ErrorKind::WouldBlock.into())
                }
                Some(Some(chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    chunk.drain(..n);

                    if chunk.is_empty() {
                        self.chunks.pop_front();
                    }

                    Ok(n)
                }
            }
        }
    }

    fn frame(body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut len = body.len() as u32;
        loop {
            let byte = (len & 0x7F) as u8;
            len >>= 7;
            if len == 0 {
                out.push(byte);
                break;
            }
            out.push(byte | 0x80);
        }
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn whole_frame_in_one_chunk() {
        let mut reader = FrameReader::new();
        let mut source = ScriptedSource::new(vec![Some(frame(b"hello"))]);

        let mut seen = Vec::new();
        let outcome = reader
            .pump(&mut source, |input| {
                let mut body = [0_u8; 5];
                input.read_exact(&mut body).unwrap();
                seen.extend_from_slice(&body);
                assert_eq!(0, input.remaining());
                Ok(())
            })
            .unwrap();

        assert!(matches!(outcome, ReadOutcome::Frame));
        assert_eq!(b"hello", &seen[..]);
    }

    #[test]
    fn byte_at_a_time_delivery() {
        let body: Vec<u8> = (0..300_u32).map(|i| i as u8).collect();
        let wire = frame(&body);

        // every byte in its own chunk, with a block between each
        let mut chunks = Vec::new();
        for byte in &wire {
            chunks.push(Some(vec![*byte]));
            chunks.push(None);
        }

        let mut reader = FrameReader::new();
        let mut source = ScriptedSource::new(chunks);

        let mut frames = 0;
        let mut received = Vec::new();

        loop {
            let outcome = reader
                .pump(&mut source, |input| {
                    let mut buf = vec![0_u8; input.remaining()];
                    input.read_exact(&mut buf).unwrap();
                    received.extend_from_slice(&buf);
                    frames += 1;
                    Ok(())
                })
                .unwrap();

            match outcome {
                ReadOutcome::Frame => break,
                ReadOutcome::WouldBlock => {}
                other => panic!("unexpected outcome: {other:?}"),
            }
        }

        assert_eq!(1, frames);
        assert_eq!(body, received);
    }

    #[test]
    fn partial_length_then_body() {
        // scenario: 300-byte body, first chunk carries only the first length byte 0xAC
        let body = vec![0xAB_u8; 300];
        let wire = frame(&body);
        assert_eq!(0xAC, wire[0]);

        let mut reader = FrameReader::new();
        let mut source = ScriptedSource::new(vec![
            Some(wire[..1].to_vec()),
            None,
            Some(wire[1..].to_vec()),
        ]);

        let mut delivered = 0;
        assert!(matches!(
            reader.pump(&mut source, |_| Ok(())).unwrap(),
            ReadOutcome::WouldBlock
        ));

        let outcome = reader
            .pump(&mut source, |input| {
                delivered = input.remaining();
                Ok(())
            })
            .unwrap();

        assert!(matches!(outcome, ReadOutcome::Frame));
        assert_eq!(300, delivered);
    }

    #[test]
    fn two_frames_two_pumps() {
        let mut wire = frame(b"one");
        wire.extend_from_slice(&frame(b"two"));

        let mut reader = FrameReader::new();
        let mut source = ScriptedSource::new(vec![Some(wire)]);

        let mut bodies = Vec::new();
        for _ in 0..2 {
            let outcome = reader
                .pump(&mut source, |input| {
                    let mut buf = vec![0_u8; input.remaining()];
                    input.read_exact(&mut buf).unwrap();
                    bodies.push(buf);
                    Ok(())
                })
                .unwrap();
            assert!(matches!(outcome, ReadOutcome::Frame));
        }

        assert_eq!(vec![b"one".to_vec(), b"two".to_vec()], bodies);
    }

    #[test]
    fn zero_length_packet_closes() {
        let mut reader = FrameReader::new();
        let mut source = ScriptedSource::new(vec![Some(vec![0x00])]);

        assert!(matches!(
            reader.pump(&mut source, |_| Ok(())).unwrap(),
            ReadOutcome::Closed
        ));
    }

    #[test]
    fn oversized_packet_closes() {
        let mut reader = FrameReader::new();
        reader.set_max_packet_size(16);

        let mut source = ScriptedSource::new(vec![Some(frame(&[0_u8; 32]))]);
        assert!(matches!(
            reader.pump(&mut source, |_| Ok(())).unwrap(),
            ReadOutcome::Closed
        ));
    }

    #[test]
    fn overlong_length_prefix_closes() {
        let mut reader = FrameReader::new();
        let mut source =
            ScriptedSource::new(vec![Some(vec![0x80, 0x80, 0x80, 0x80, 0x80, 0x01])]);

        assert!(matches!(
            reader.pump(&mut source, |_| Ok(())).unwrap(),
            ReadOutcome::Closed
        ));
    }

    #[test]
    fn peer_close_mid_body() {
        let mut wire = frame(b"abcdef");
        wire.truncate(4);

        let mut source = ScriptedSource::new(vec![Some(wire)]);
        source.closed_at_end = true;

        let mut reader = FrameReader::new();
        assert!(matches!(
            reader.pump(&mut source, |_| Ok(())).unwrap(),
            ReadOutcome::Closed
        ));
    }

    #[test]
    fn large_body_uses_heap_path() {
        let body = vec![0x5A_u8; STACK_BUFFER * 2];
        let wire = frame(&body);

        let mut reader = FrameReader::new();
        let mut source = ScriptedSource::new(vec![Some(wire)]);

        let mut delivered = 0;
        let outcome = reader
            .pump(&mut source, |input| {
                delivered = input.remaining();
                Ok(())
            })
            .unwrap();

        assert!(matches!(outcome, ReadOutcome::Frame));
        assert_eq!(STACK_BUFFER * 2, delivered);
    }

    #[test]
    fn handler_error_is_reported() {
        let mut reader = FrameReader::new();
        let mut source = ScriptedSource::new(vec![Some(frame(b"x"))]);

        let outcome = reader
            .pump(&mut source, |_| {
                Err(sculk_protocol::CodecError::malformed("boom"))
            })
            .unwrap();

        assert!(matches!(outcome, ReadOutcome::Failed(_)));
    }
}
