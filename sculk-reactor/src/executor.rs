//!
//! An executor that runs cooperative tasks in the idle time of the polling loop.
//!
//! The executor is split in two: a clonable [`Executor`] handle for enqueuing work, and the
//! [`ExecutorDriver`] descriptor that the reactor owns. The two halves share a FIFO queue and a
//! socketpair; enqueuing onto an empty queue writes one wake byte, which makes the driver's read
//! side ready and pulls the queue into the next dispatch round.
//!
//! Tasks advance in slices: [`Task::advance`] returning `true` sends the task to the back of the
//! queue, `false` (or an error) retires it. At most [`TASKS_PER_DISPATCH`] advances run per
//! dispatch so that bulky tasks cannot starve I/O; while a backlog remains the driver returns
//! [`Next::More`] and runs again in the same loop.

use crate::{Cx, Descriptor, Interest, Next};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::rc::Rc;

///
/// How many task advances run per driver dispatch. Bounds the time spent away from I/O.
pub const TASKS_PER_DISPATCH: usize = 16;

///
/// A unit of deferred work.
pub trait Task {
    ///
    /// Advances the task by one slice. Returns `true` to keep running (the task goes to the back
    /// of the queue) or `false` when finished.
    ///
    /// # Errors
    /// An error retires the task, as if it had returned `false`.
    fn advance(&mut self) -> io::Result<bool>;
}

struct Shared {
    queue: RefCell<VecDeque<Box<dyn Task>>>,
    wake: UnixStream,
}

///
/// The enqueue side of the executor. Clonable; all clones feed the same driver.
#[derive(Clone)]
pub struct Executor {
    shared: Rc<Shared>,
}

///
/// The descriptor side of the executor; insert it into the reactor with read interest.
pub struct ExecutorDriver {
    shared: Rc<Shared>,
    wake_rx: UnixStream,
}

impl Executor {
    ///
    /// Creates an executor pair.
    ///
    /// # Errors
    /// Returns `Err` if the wake socketpair cannot be created.
    pub fn new() -> io::Result<(Executor, ExecutorDriver)> {
        let (wake, wake_rx) = UnixStream::pair()?;
        wake.set_nonblocking(true)?;
        wake_rx.set_nonblocking(true)?;

        let shared = Rc::new(Shared {
            queue: RefCell::new(VecDeque::new()),
            wake,
        });

        let driver = ExecutorDriver {
            shared: Rc::clone(&shared),
            wake_rx,
        };

        Ok((Executor { shared }, driver))
    }

    ///
    /// Enqueues a task. If the queue was empty, the driver is woken through its descriptor.
    ///
    /// # Errors
    /// Returns `Err` if the wake byte cannot be written.
    pub fn enqueue(&self, task: Box<dyn Task>) -> io::Result<()> {
        let mut queue = self.shared.queue.borrow_mut();

        if queue.is_empty() {
            (&self.shared.wake).write_all(&[1])?;
        }

        queue.push_back(task);
        Ok(())
    }

    ///
    /// The number of tasks currently queued.
    #[must_use]
    pub fn backlog(&self) -> usize {
        self.shared.queue.borrow().len()
    }
}

impl Descriptor for ExecutorDriver {
    fn raw_fd(&self) -> RawFd {
        self.wake_rx.as_raw_fd()
    }

    fn handle(&mut self, active: &mut Interest, _cx: &mut Cx<'_>) -> io::Result<Next> {
        if !active.contains(Interest::READ) {
            return Ok(Next::Poll);
        }

        for _ in 0..TASKS_PER_DISPATCH {
            // the queue borrow is released while the task runs, so tasks may enqueue more work
            let Some(mut task) = self.shared.queue.borrow_mut().pop_front() else {
                break;
            };

            match task.advance() {
                Ok(true) => self.shared.queue.borrow_mut().push_back(task),
                Ok(false) => {}
                Err(error) => {
                    log::debug!("idle task failed: {error}");
                }
            }
        }

        if !self.shared.queue.borrow().is_empty() {
            return Ok(Next::More);
        }

        // drained; absorb the wake bytes before going back to sleep
        let mut buf = [0_u8; 16];
        loop {
            match (&self.wake_rx).read(&mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => break,
                Err(error) => return Err(error),
            }
        }

        *active = active.without(Interest::READ);
        Ok(Next::Poll)
    }
}
