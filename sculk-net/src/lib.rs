//!
//! Non-blocking networking for the sculk stack: the packet-length framing state machine and the
//! queued write half, combined into a [`Connection`] descriptor for the reactor.
//!
//! Reads frame length-prefixed packets off a non-blocking socket and hand each complete body to
//! a [`PacketHandler`] as a bounded [`sculk_stream::SliceInput`]. Writes go through a
//! [`WriteQueue`] that falls back to queueing (in-memory buffers or file ranges) whenever the
//! kernel would block, preserving call order across both kinds.

///
/// The packet-length framing state machine.
pub mod framing;

///
/// The non-blocking write queue.
pub mod writable;

///
/// The connection descriptor tying both halves together.
pub mod connection;

pub use connection::{Connection, ConnectionIo, PacketHandler};
pub use framing::{FrameReader, InSource, ReadOutcome, SocketSource};
pub use writable::{OutSink, SocketSink, WriteQueue};
