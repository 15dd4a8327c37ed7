//!
//! The queued write half of a non-blocking descriptor.
//!
//! A [`WriteQueue`] owns a FIFO of pending output: reference-counted byte regions and file
//! ranges. Writing tries the syscall directly while the queue is empty; once the kernel pushes
//! back, the unsent remainder is queued and the owner arms write interest. Draining happens in
//! [`WriteQueue::handle_write`] when the descriptor becomes writable again. Delivery order
//! always matches call order, regardless of which entries took the fast path.
//!
//! The syscall boundary is the [`OutSink`] trait, so the queue logic can run against a scripted
//! sink in tests. The real sink, [`SocketSink`], writes to a `TcpStream` and transfers file
//! ranges with `sendfile64` where the platform has it.

use bytes::{Buf, Bytes};
use sculk_reactor::{Interest, Next};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Write};
use std::net::TcpStream;
use std::rc::Rc;

///
/// The syscall boundary used by [`WriteQueue`].
pub trait OutSink {
    ///
    /// Writes bytes, returning how many the kernel accepted.
    ///
    /// # Errors
    /// `WouldBlock` signals kernel pushback; any other error is fatal for the stream.
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    ///
    /// Transfers up to `len` bytes of `file` starting at `offset`, returning how many were
    /// accepted.
    ///
    /// # Errors
    /// `WouldBlock` signals kernel pushback; any other error is fatal for the stream.
    fn send_file(&mut self, file: &File, offset: u64, len: usize) -> io::Result<usize>;
}

///
/// [`OutSink`] over a non-blocking `TcpStream`.
pub struct SocketSink<'a>(pub &'a TcpStream);

impl OutSink for SocketSink<'_> {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut stream = self.0;
        stream.write(buf)
    }

    #[cfg(target_os = "linux")]
    fn send_file(&mut self, file: &File, offset: u64, len: usize) -> io::Result<usize> {
        use std::os::unix::io::AsRawFd;

        let mut file_offset = libc::off64_t::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "file offset out of range"))?;

        // SAFETY:
        // - both descriptors are owned by live objects for the duration of the call
        // - `file_offset` points at a stack variable of the correct type
        let sent = unsafe {
            libc::sendfile64(
                self.0.as_raw_fd(),
                file.as_raw_fd(),
                &mut file_offset,
                len,
            )
        };

        if sent < 0 {
            return Err(io::Error::last_os_error());
        }

        #[allow(clippy::cast_sign_loss, reason = "Negative returns were handled above")]
        Ok(sent as usize)
    }

    #[cfg(not(target_os = "linux"))]
    fn send_file(&mut self, file: &File, offset: u64, len: usize) -> io::Result<usize> {
        use std::os::unix::fs::FileExt;

        // no zero-copy transfer available; bounce through a stack buffer
        let mut buf = [0_u8; 16 * 1024];
        let chunk = len.min(buf.len());

        let read = file.read_at(&mut buf[..chunk], offset)?;
        if read == 0 {
            return Ok(0);
        }

        let mut stream = self.0;
        stream.write(&buf[..read])
    }
}

enum WriteNode {
    Buffer {
        data: Bytes,
    },
    FileRange {
        file: Rc<File>,
        offset: u64,
        remaining: u64,
    },
}

///
/// The write queue. See the module documentation.
#[derive(Default)]
pub struct WriteQueue {
    queue: VecDeque<WriteNode>,
    close_indicated: bool,
}

impl WriteQueue {
    ///
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    ///
    /// Whether any output is still queued.
    #[must_use]
    pub fn pending(&self) -> bool {
        !self.queue.is_empty()
    }

    ///
    /// Whether [`WriteQueue::indicate_close`] has been called.
    #[must_use]
    pub fn close_indicated(&self) -> bool {
        self.close_indicated
    }

    ///
    /// Refuses further writes; already queued output still drains, and once it has,
    /// [`WriteQueue::handle_write`] reports [`Next::Final`].
    pub fn indicate_close(&mut self) {
        self.close_indicated = true;
    }

    ///
    /// Writes a borrowed buffer. If the kernel leaves a remainder, a copy of it is queued; the
    /// caller must then arm write interest (see [`WriteQueue::pending`]).
    ///
    /// # Errors
    /// Propagates fatal sink errors. Kernel pushback is not an error.
    pub fn write<S: OutSink>(&mut self, sink: &mut S, buf: &[u8]) -> io::Result<()> {
        if buf.is_empty() || self.close_indicated {
            return Ok(());
        }

        if !self.queue.is_empty() {
            self.queue.push_back(WriteNode::Buffer {
                data: Bytes::copy_from_slice(buf),
            });
            return Ok(());
        }

        match sink.send(buf) {
            Ok(0) => Err(io::ErrorKind::WriteZero.into()),
            Ok(sent) if sent >= buf.len() => Ok(()),
            Ok(sent) => {
                self.queue.push_back(WriteNode::Buffer {
                    data: Bytes::copy_from_slice(&buf[sent..]),
                });
                Ok(())
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                self.queue.push_back(WriteNode::Buffer {
                    data: Bytes::copy_from_slice(buf),
                });
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    ///
    /// Writes a shared buffer. Same semantics as [`WriteQueue::write`], but a queued remainder
    /// shares the caller's allocation instead of copying it.
    ///
    /// # Errors
    /// Propagates fatal sink errors. Kernel pushback is not an error.
    pub fn write_shared<S: OutSink>(&mut self, sink: &mut S, data: Bytes) -> io::Result<()> {
        if data.is_empty() || self.close_indicated {
            return Ok(());
        }

        if !self.queue.is_empty() {
            self.queue.push_back(WriteNode::Buffer { data });
            return Ok(());
        }

        match sink.send(&data) {
            Ok(0) => Err(io::ErrorKind::WriteZero.into()),
            Ok(sent) if sent >= data.len() => Ok(()),
            Ok(sent) => {
                self.queue.push_back(WriteNode::Buffer {
                    data: data.slice(sent..),
                });
                Ok(())
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                self.queue.push_back(WriteNode::Buffer { data });
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    ///
    /// Queues a file range for transfer. Same semantics as [`WriteQueue::write`].
    ///
    /// # Errors
    /// Propagates fatal sink errors. Kernel pushback is not an error.
    pub fn send_file<S: OutSink>(
        &mut self,
        sink: &mut S,
        file: Rc<File>,
        offset: u64,
        len: u64,
    ) -> io::Result<()> {
        if len == 0 || self.close_indicated {
            return Ok(());
        }

        if !self.queue.is_empty() {
            self.queue.push_back(WriteNode::FileRange {
                file,
                offset,
                remaining: len,
            });
            return Ok(());
        }

        let chunk = usize::try_from(len).unwrap_or(usize::MAX);
        match sink.send_file(&file, offset, chunk) {
            Ok(0) => Err(io::ErrorKind::WriteZero.into()),
            Ok(sent) if sent as u64 >= len => Ok(()),
            Ok(sent) => {
                self.queue.push_back(WriteNode::FileRange {
                    file,
                    offset: offset + sent as u64,
                    remaining: len - sent as u64,
                });
                Ok(())
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                self.queue.push_back(WriteNode::FileRange {
                    file,
                    offset,
                    remaining: len,
                });
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    ///
    /// Drains the queue while the descriptor is write-ready.
    ///
    /// With no write readiness in `active`, reports [`Next::Final`] only when the close was
    /// indicated and nothing remains queued. Otherwise entries drain in FIFO order until the
    /// queue empties (write readiness is cleared from `active`; [`Next::Final`] or
    /// [`Next::Poll`] per the close indication) or the kernel pushes back ([`Next::Poll`]).
    ///
    /// # Errors
    /// A fatal sink error clears the queue and propagates; the descriptor should be destroyed.
    pub fn handle_write<S: OutSink>(
        &mut self,
        sink: &mut S,
        active: &mut Interest,
    ) -> io::Result<Next> {
        if !active.contains(Interest::WRITE) {
            if self.close_indicated && self.queue.is_empty() {
                return Ok(Next::Final);
            }

            return Ok(Next::Poll);
        }

        while let Some(front) = self.queue.front_mut() {
            let result = match front {
                WriteNode::Buffer { data } => match sink.send(data) {
                    Ok(sent) => Ok(sent as u64),
                    Err(error) => Err(error),
                },
                WriteNode::FileRange {
                    file,
                    offset,
                    remaining,
                } => {
                    let chunk = usize::try_from(*remaining).unwrap_or(usize::MAX);
                    sink.send_file(file, *offset, chunk).map(|sent| sent as u64)
                }
            };

            match result {
                Ok(0) => {
                    self.queue.clear();
                    return Err(io::ErrorKind::WriteZero.into());
                }
                Ok(sent) => {
                    let emptied = match front {
                        WriteNode::Buffer { data } => {
                            #[allow(
                                clippy::cast_possible_truncation,
                                reason = "The sink never reports more than the usize it was given"
                            )]
                            data.advance(sent as usize);
                            data.is_empty()
                        }
                        WriteNode::FileRange {
                            offset, remaining, ..
                        } => {
                            *offset += sent;
                            *remaining -= sent.min(*remaining);
                            *remaining == 0
                        }
                    };

                    if emptied {
                        self.queue.pop_front();
                    }
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(Next::Poll);
                }
                Err(error) => {
                    self.queue.clear();
                    return Err(error);
                }
            }
        }

        *active = active.without(Interest::WRITE);

        if self.close_indicated {
            Ok(Next::Final)
        } else {
            Ok(Next::Poll)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::writable::{OutSink, WriteQueue};
    use bytes::Bytes;
    use sculk_reactor::{Interest, Next};
    use std::collections::VecDeque;
    use std::fs::File;
    use std::io::{self, Write};
    use std::os::unix::fs::FileExt;
    use std::rc::Rc;

    // Accepts a scripted number of bytes per call, then blocks; records everything accepted.
    struct ScriptedSink {
        budgets: VecDeque<usize>,
        written: Vec<u8>,
    }

    impl ScriptedSink {
        fn new(budgets: &[usize]) -> Self {
            Self {
                budgets: budgets.iter().copied().collect(),
                written: Vec::new(),
            }
        }

        fn budget(&mut self) -> io::Result<usize> {
            match self.budgets.pop_front() {
                Some(0) | None => Err(io::ErrorKind::WouldBlock.into()),
                Some(budget) => Ok(budget),
            }
        }
    }

    impl OutSink for ScriptedSink {
        fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
            let budget = self.budget()?;
            let accepted = budget.min(buf.len());
            self.written.extend_from_slice(&buf[..accepted]);
            Ok(accepted)
        }

        fn send_file(&mut self, file: &File, offset: u64, len: usize) -> io::Result<usize> {
            let budget = self.budget()?;
            let accepted = budget.min(len);

            let mut chunk = vec![0_u8; accepted];
            let read = file.read_at(&mut chunk, offset)?;
            self.written.extend_from_slice(&chunk[..read]);
            Ok(read)
        }
    }

    fn scratch_file(contents: &[u8]) -> Rc<File> {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "sculk-writable-test-{}-{:p}",
            std::process::id(),
            &path
        ));

        let mut file = File::create(&path).unwrap();
        file.write_all(contents).unwrap();

        let file = File::open(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        Rc::new(file)
    }

    #[test]
    fn fast_path_skips_the_queue() {
        let mut sink = ScriptedSink::new(&[64]);
        let mut queue = WriteQueue::new();

        queue.write(&mut sink, b"hello").unwrap();

        assert!(!queue.pending());
        assert_eq!(b"hello", &sink.written[..]);
    }

    #[test]
    fn partial_write_queues_the_tail() {
        // kernel accepts 100 of 250, then 100, then 50
        let mut sink = ScriptedSink::new(&[100]);
        let mut queue = WriteQueue::new();

        let payload: Vec<u8> = (0..250_u32).map(|i| i as u8).collect();
        queue.write(&mut sink, &payload).unwrap();

        assert!(queue.pending());
        assert_eq!(100, sink.written.len());

        sink.budgets.extend([100, 50, 1]);
        let mut active = Interest::WRITE;
        let next = queue.handle_write(&mut sink, &mut active).unwrap();

        assert_eq!(Next::Poll, next);
        assert!(!queue.pending());
        assert!(!active.contains(Interest::WRITE));
        assert_eq!(payload, sink.written);
    }

    #[test]
    fn close_indicated_drain_reports_final() {
        let mut sink = ScriptedSink::new(&[100]);
        let mut queue = WriteQueue::new();

        let payload = vec![7_u8; 250];
        queue.write(&mut sink, &payload).unwrap();
        queue.indicate_close();

        // first readiness: 100 accepted, 50 left, kernel blocks again
        sink.budgets.extend([100]);
        let mut active = Interest::WRITE;
        assert_eq!(Next::Poll, queue.handle_write(&mut sink, &mut active).unwrap());
        assert!(queue.pending());

        // second readiness: the rest goes out and the close takes effect
        sink.budgets.extend([50, 1]);
        let mut active = Interest::WRITE;
        assert_eq!(Next::Final, queue.handle_write(&mut sink, &mut active).unwrap());
        assert_eq!(250, sink.written.len());
    }

    #[test]
    fn order_preserved_across_node_kinds() {
        // nothing goes out on the fast path
        let mut sink = ScriptedSink::new(&[]);
        let mut queue = WriteQueue::new();

        queue.write(&mut sink, b"AA").unwrap();
        queue
            .send_file(&mut sink, scratch_file(b"BBB"), 0, 3)
            .unwrap();
        queue
            .write_shared(&mut sink, Bytes::from_static(b"CC"))
            .unwrap();

        // tiny budgets force several partial progressions
        sink.budgets.extend([1, 1, 2, 1, 3, 1]);
        let mut active = Interest::WRITE;
        while queue.pending() {
            queue.handle_write(&mut sink, &mut active).unwrap();
            active = Interest::WRITE;
        }

        assert_eq!(b"AABBBCC", &sink.written[..]);
    }

    #[test]
    fn file_range_respects_offset_and_len() {
        let mut sink = ScriptedSink::new(&[]);
        let mut queue = WriteQueue::new();

        queue
            .send_file(&mut sink, scratch_file(b"0123456789"), 2, 5)
            .unwrap();

        sink.budgets.extend([64]);
        let mut active = Interest::WRITE;
        queue.handle_write(&mut sink, &mut active).unwrap();

        assert_eq!(b"23456", &sink.written[..]);
    }

    #[test]
    fn writes_after_close_are_dropped() {
        let mut sink = ScriptedSink::new(&[64]);
        let mut queue = WriteQueue::new();

        queue.indicate_close();
        queue.write(&mut sink, b"late").unwrap();

        assert!(!queue.pending());
        assert!(sink.written.is_empty());
    }

    #[test]
    fn idle_closed_queue_is_final_without_write_readiness() {
        let mut sink = ScriptedSink::new(&[]);
        let mut queue = WriteQueue::new();
        queue.indicate_close();

        let mut active = Interest::READ;
        assert_eq!(Next::Final, queue.handle_write(&mut sink, &mut active).unwrap());
    }

    #[test]
    fn hard_error_clears_the_queue() {
        struct BrokenSink;

        impl OutSink for BrokenSink {
            fn send(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::ErrorKind::ConnectionReset.into())
            }

            fn send_file(&mut self, _file: &File, _offset: u64, _len: usize) -> io::Result<usize> {
                Err(io::ErrorKind::ConnectionReset.into())
            }
        }

        let mut queue = WriteQueue::new();
        let mut blocked = ScriptedSink::new(&[]);
        queue.write(&mut blocked, b"data").unwrap();
        assert!(queue.pending());

        let mut active = Interest::WRITE;
        assert!(queue.handle_write(&mut BrokenSink, &mut active).is_err());
        assert!(!queue.pending());
    }
}
