//!
//! The connection descriptor: packet framing on the read half, the write queue on the write
//! half, combined into one [`sculk_reactor::Descriptor`].
//!
//! Incoming bytes advance the [`FrameReader`]; each complete packet reaches the
//! [`PacketHandler`] with a bounded input stream over the body and an I/O handle for replies. A
//! handler error closes the read half; queued output still drains before the descriptor turns
//! final, which is also how [`Connection::indicate_disconnect`] shuts a client down gracefully.

use crate::framing::{FrameReader, ReadOutcome, SocketSource};
use crate::writable::{SocketSink, WriteQueue};
use bytes::Bytes;
use sculk_protocol::CodecError;
use sculk_reactor::{Cx, Descriptor, Interest, Next};
use sculk_stream::SliceInput;
use std::fs::File;
use std::io;
use std::net::TcpStream;
use std::os::unix::io::{AsRawFd, RawFd};
use std::rc::Rc;

///
/// Decodes and reacts to complete packets.
pub trait PacketHandler {
    ///
    /// Called once per framed packet, with `packet` positioned at the body's first byte.
    /// Replies and shutdown requests go through `io`.
    ///
    /// # Errors
    /// An error closes the connection's read half; queued writes still drain before the
    /// connection goes away.
    fn handle_packet(
        &mut self,
        packet: &mut SliceInput<'_>,
        io: &mut ConnectionIo<'_>,
    ) -> Result<(), CodecError>;
}

///
/// The I/O surface a [`PacketHandler`] sees while handling a packet.
pub struct ConnectionIo<'a> {
    stream: &'a TcpStream,
    queue: &'a mut WriteQueue,
    disconnect: bool,
}

impl ConnectionIo<'_> {
    ///
    /// Writes a borrowed buffer; see [`WriteQueue::write`].
    ///
    /// # Errors
    /// Propagates fatal socket errors.
    pub fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut sink = SocketSink(self.stream);
        self.queue.write(&mut sink, buf)
    }

    ///
    /// Writes a shared buffer without copying; see [`WriteQueue::write_shared`].
    ///
    /// # Errors
    /// Propagates fatal socket errors.
    pub fn write_shared(&mut self, data: Bytes) -> io::Result<()> {
        let mut sink = SocketSink(self.stream);
        self.queue.write_shared(&mut sink, data)
    }

    ///
    /// Queues a file range; see [`WriteQueue::send_file`].
    ///
    /// # Errors
    /// Propagates fatal socket errors.
    pub fn send_file(&mut self, file: Rc<File>, offset: u64, len: u64) -> io::Result<()> {
        let mut sink = SocketSink(self.stream);
        self.queue.send_file(&mut sink, file, offset, len)
    }

    ///
    /// Requests a graceful disconnect: no more packets are read, queued writes drain, then the
    /// connection is destroyed.
    pub fn disconnect(&mut self) {
        self.disconnect = true;
    }
}

///
/// A framed, non-blocking client connection. Insert into a reactor with read interest.
pub struct Connection<H> {
    stream: TcpStream,
    reader: FrameReader,
    queue: WriteQueue,
    handler: H,
    read_closed: bool,
}

impl<H> Connection<H> {
    ///
    /// Wraps an accepted socket. The socket is switched to non-blocking mode.
    ///
    /// # Errors
    /// Returns `Err` if the socket mode cannot be changed.
    pub fn new(stream: TcpStream, handler: H) -> io::Result<Self> {
        stream.set_nonblocking(true)?;

        Ok(Self {
            stream,
            reader: FrameReader::new(),
            queue: WriteQueue::new(),
            handler,
            read_closed: false,
        })
    }

    ///
    /// Restricts the accepted packet size; see [`FrameReader::set_max_packet_size`].
    pub fn set_max_packet_size(&mut self, max: usize) {
        self.reader.set_max_packet_size(max);
    }

    ///
    /// The current packet size restriction; zero means unrestricted.
    #[must_use]
    pub fn max_packet_size(&self) -> usize {
        self.reader.max_packet_size()
    }

    ///
    /// Marks both halves for graceful shutdown: nothing more is read, queued writes continue
    /// until drained, then the descriptor reports [`Next::Final`].
    pub fn indicate_disconnect(&mut self) {
        self.read_closed = true;
        self.queue.indicate_close();
    }

    ///
    /// Whether queued output remains. A caller that wrote from outside `handle` uses this to
    /// decide whether write interest must be armed via the reactor.
    #[must_use]
    pub fn pending_writes(&self) -> bool {
        self.queue.pending()
    }

    ///
    /// Writes from outside the handler callback; see [`WriteQueue::write`].
    ///
    /// # Errors
    /// Propagates fatal socket errors.
    pub fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut sink = SocketSink(&self.stream);
        self.queue.write(&mut sink, buf)
    }

    ///
    /// Writes a shared buffer from outside the handler callback.
    ///
    /// # Errors
    /// Propagates fatal socket errors.
    pub fn write_shared(&mut self, data: Bytes) -> io::Result<()> {
        let mut sink = SocketSink(&self.stream);
        self.queue.write_shared(&mut sink, data)
    }

    ///
    /// Queues a file range from outside the handler callback.
    ///
    /// # Errors
    /// Propagates fatal socket errors.
    pub fn send_file(&mut self, file: Rc<File>, offset: u64, len: u64) -> io::Result<()> {
        let mut sink = SocketSink(&self.stream);
        self.queue.send_file(&mut sink, file, offset, len)
    }
}

impl<H: PacketHandler> Connection<H> {
    fn handle_read(&mut self, active: &mut Interest) -> io::Result<Next> {
        if self.read_closed {
            *active = active.without(Interest::READ);
            return Ok(Next::Final);
        }

        if !active.contains(Interest::READ) {
            return Ok(Next::Poll);
        }

        let Connection {
            stream,
            reader,
            queue,
            handler,
            ..
        } = self;

        // both the source and the handler's reply path share the socket immutably
        let stream: &TcpStream = stream;
        let mut source = SocketSource(stream);
        let mut disconnect = false;

        let outcome = reader.pump(&mut source, |packet| {
            let mut io = ConnectionIo {
                stream,
                queue,
                disconnect: false,
            };

            let result = handler.handle_packet(packet, &mut io);
            disconnect = io.disconnect;
            result
        })?;

        if disconnect {
            self.indicate_disconnect();
        }

        match outcome {
            ReadOutcome::Frame => Ok(Next::More),
            ReadOutcome::WouldBlock => {
                *active = active.without(Interest::READ);
                Ok(Next::Poll)
            }
            ReadOutcome::Closed => {
                self.indicate_disconnect();
                *active = active.without(Interest::READ);
                Ok(Next::Final)
            }
            ReadOutcome::Failed(error) => {
                log::debug!("packet handler failed, closing read half: {error}");
                self.indicate_disconnect();
                *active = active.without(Interest::READ);
                Ok(Next::Final)
            }
        }
    }
}

impl<H: PacketHandler> Descriptor for Connection<H> {
    fn raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    fn handle(&mut self, active: &mut Interest, cx: &mut Cx<'_>) -> io::Result<Next> {
        let read_next = self.handle_read(active)?;

        let write_next = {
            let mut sink = SocketSink(&self.stream);
            self.queue.handle_write(&mut sink, active)?
        };

        // the interest for the next re-arm follows the halves' remaining appetite
        let mut interest = Interest::NONE;
        if !self.read_closed {
            interest |= Interest::READ;
        }
        if self.queue.pending() {
            interest |= Interest::WRITE;
        }
        cx.set_interest(interest);

        // combined status: a read that produced a frame yields More so the loop runs it again;
        // otherwise the write half decides (it holds Poll while output drains and turns Final
        // once a closed connection runs dry)
        if read_next == Next::More {
            Ok(Next::More)
        } else {
            Ok(write_next)
        }
    }
}
