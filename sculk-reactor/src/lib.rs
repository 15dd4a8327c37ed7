//!
//! A single-threaded I/O multiplexer for non-blocking descriptors.
//!
//! The [`Reactor`] owns a set of [`Descriptor`]s, polls the OS for readiness with one-shot
//! semantics, and dispatches `handle` callbacks from a ready queue. Each call to
//! [`Reactor::execute`] runs until one tick (50 ms by default) has elapsed, so a caller can
//! interleave I/O with periodic work by looping over `execute`.
//!
//! A descriptor's `handle` returns [`Next::Poll`] to be re-armed with the kernel, [`Next::More`]
//! to yield but be called again without a syscall, or [`Next::Final`] to be destroyed. Interest
//! changes made from inside `handle` are applied lazily at the next re-arm, and removing the
//! executing descriptor is deferred until its callback returns, so callbacks never destroy
//! themselves mid-frame.
//!
//! Nothing here is thread-safe; the reactor and every descriptor live on one thread.

///
/// The idle-task executor.
pub mod executor;

pub use executor::{Executor, ExecutorDriver, Task};

use polling::{Event, Poller};
use std::collections::VecDeque;
use std::io;
use std::mem;
use std::ops::{BitOr, BitOrAssign};
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

///
/// The default tick: one Minecraft server tick, 50 ms.
pub const DEFAULT_TICK: Duration = Duration::from_millis(50);

///
/// A set of I/O directions, used both for registered interest and for the active events passed
/// to [`Descriptor::handle`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Interest(u8);

impl Interest {
    ///
    /// The empty set.
    pub const NONE: Interest = Interest(0);

    ///
    /// Readability.
    pub const READ: Interest = Interest(1);

    ///
    /// Writability.
    pub const WRITE: Interest = Interest(2);

    ///
    /// Tests whether every direction in `other` is present.
    #[must_use]
    pub const fn contains(self, other: Interest) -> bool {
        self.0 & other.0 == other.0
    }

    ///
    /// The union of both sets.
    #[must_use]
    pub const fn with(self, other: Interest) -> Interest {
        Interest(self.0 | other.0)
    }

    ///
    /// This set with every direction in `other` removed.
    #[must_use]
    pub const fn without(self, other: Interest) -> Interest {
        Interest(self.0 & !other.0)
    }

    ///
    /// Whether the set is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.with(rhs)
    }
}

impl BitOrAssign for Interest {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.with(rhs);
    }
}

///
/// What a descriptor wants to happen after its `handle` callback.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Next {
    ///
    /// Re-arm with the kernel and wait for the next event.
    Poll,

    ///
    /// Yield, but call `handle` again in the same loop without a syscall.
    More,

    ///
    /// No more I/O will be performed; remove and destroy the descriptor.
    Final,
}

///
/// Identifies a descriptor registered with a reactor.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Token(usize);

///
/// A managed OS handle with its event logic.
///
/// The implementation owns the handle and closes it on drop; the reactor guarantees the drop
/// happens only after the kernel registration has been removed.
pub trait Descriptor {
    ///
    /// The raw OS handle. Must stay constant for the lifetime of the descriptor and refer to a
    /// non-blocking file description.
    fn raw_fd(&self) -> RawFd;

    ///
    /// Handles an event. `active` holds the directions the last kernel notification reported;
    /// the implementation may clear bits it has exhausted (a read that hit would-block clears
    /// [`Interest::READ`]), and a [`Next::More`] return sees the updated mask on the next call.
    ///
    /// # Errors
    /// An error destroys the descriptor, as if it had returned [`Next::Final`].
    fn handle(&mut self, active: &mut Interest, cx: &mut Cx<'_>) -> io::Result<Next>;
}

///
/// The reactor-side context handed to [`Descriptor::handle`].
///
/// Operations on the *executing* descriptor are reentrancy-safe: interest updates are applied at
/// the next re-arm, and [`Cx::remove_self`] defers destruction until the callback returns.
/// Operations on other descriptors go through [`Cx::reactor`].
pub struct Cx<'a> {
    reactor: &'a mut Reactor,
    token: Token,
}

impl Cx<'_> {
    ///
    /// The executing descriptor's token.
    #[must_use]
    pub fn token(&self) -> Token {
        self.token
    }

    ///
    /// The executing descriptor's registered interest.
    #[must_use]
    pub fn interest(&self) -> Interest {
        self.reactor
            .slot(self.token.0)
            .map(|slot| slot.interest)
            .unwrap_or(Interest::NONE)
    }

    ///
    /// Updates the executing descriptor's interest. No syscall happens here; the mask is applied
    /// when the descriptor is next re-armed after returning [`Next::Poll`].
    pub fn set_interest(&mut self, interest: Interest) {
        if let Some(slot) = self.reactor.slot_mut(self.token.0) {
            slot.interest = interest;
        }
    }

    ///
    /// Marks the executing descriptor for removal. The result of the current `handle` call is
    /// treated as [`Next::Final`].
    pub fn remove_self(&mut self) {
        if let Some(slot) = self.reactor.slot_mut(self.token.0) {
            slot.marked_removal = true;
        }
    }

    ///
    /// The owning reactor, for inserting or erasing *other* descriptors. Do not call
    /// [`Reactor::execute`] from here.
    pub fn reactor(&mut self) -> &mut Reactor {
        &mut *self.reactor
    }
}

struct Slot {
    // None while the descriptor is executing its handle callback
    desc: Option<Box<dyn Descriptor>>,
    fd: RawFd,
    interest: Interest,
    active: Interest,
    queued: bool,
    marked_removal: bool,
}

///
/// The multiplexer. See the crate documentation.
pub struct Reactor {
    poller: Poller,
    events: Vec<Event>,
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    ready: VecDeque<usize>,
    tick: Duration,
}

impl Reactor {
    ///
    /// Creates a reactor with the default tick.
    ///
    /// # Errors
    /// Returns `Err` if the OS poller cannot be created.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poller: Poller::new()?,
            events: Vec::new(),
            slots: Vec::new(),
            free: Vec::new(),
            ready: VecDeque::new(),
            tick: DEFAULT_TICK,
        })
    }

    ///
    /// The current tick duration.
    #[must_use]
    pub fn tick(&self) -> Duration {
        self.tick
    }

    ///
    /// Updates the tick duration bounding each [`Reactor::execute`] call.
    pub fn set_tick(&mut self, tick: Duration) {
        self.tick = tick;
    }

    ///
    /// Transfers a descriptor into the reactor and registers it with the kernel.
    ///
    /// # Errors
    /// Returns `Err` if kernel registration fails; the descriptor is dropped (closing its
    /// handle) in that case.
    pub fn insert(
        &mut self,
        descriptor: Box<dyn Descriptor>,
        interest: Interest,
    ) -> io::Result<Token> {
        let fd = descriptor.raw_fd();

        let key = self.free.pop().unwrap_or_else(|| {
            self.slots.push(None);
            self.slots.len() - 1
        });

        if let Err(error) = self.poller.add(fd, key_event(key, interest)) {
            self.free.push(key);
            return Err(error);
        }

        self.slots[key] = Some(Slot {
            desc: Some(descriptor),
            fd,
            interest,
            active: Interest::NONE,
            queued: false,
            marked_removal: false,
        });

        Ok(Token(key))
    }

    ///
    /// Removes and destroys a descriptor.
    ///
    /// Needed for descriptors that sleep forever and would never reach `handle`; descriptors
    /// that can, should return [`Next::Final`] instead. Calling this for the currently executing
    /// descriptor (via [`Cx::reactor`]) defers the removal until its callback returns.
    pub fn erase(&mut self, token: Token) {
        let executing = match self.slot_mut(token.0) {
            Some(slot) => slot.desc.is_none(),
            None => return,
        };

        if executing {
            // destruction happens after the running handle returns
            if let Some(slot) = self.slot_mut(token.0) {
                slot.marked_removal = true;
            }
        } else {
            self.remove_key(token.0);
        }
    }

    ///
    /// Updates a descriptor's interest from outside its `handle` callback, re-arming the kernel
    /// registration immediately.
    ///
    /// # Errors
    /// Returns `Err` if the kernel rejects the update; the previous interest is kept.
    pub fn set_interest(&mut self, token: Token, interest: Interest) -> io::Result<()> {
        let Some(slot) = self.slot_mut(token.0) else {
            return Ok(());
        };

        if slot.desc.is_none() {
            // executing; applied at the next re-arm
            slot.interest = interest;
            return Ok(());
        }

        let old = slot.interest;
        let fd = slot.fd;
        slot.interest = interest;

        if let Err(error) = self.poller.modify(fd, key_event(token.0, interest)) {
            if let Some(slot) = self.slot_mut(token.0) {
                slot.interest = old;
            }

            return Err(error);
        }

        Ok(())
    }

    ///
    /// Runs the polling loop until one tick has elapsed.
    ///
    /// While the ready queue holds descriptors (previous [`Next::More`] returns or batched
    /// events), the kernel is polled with a zero timeout; otherwise the call blocks until an
    /// event arrives or the tick deadline passes.
    ///
    /// # Errors
    /// Returns `Err` only for poller-level failures. Errors from descriptor callbacks destroy
    /// the descriptor and are not propagated.
    pub fn execute(&mut self) -> io::Result<()> {
        let deadline = Instant::now() + self.tick;

        loop {
            let timeout = if self.ready.is_empty() {
                match deadline.checked_duration_since(Instant::now()) {
                    Some(remaining) => remaining,
                    None => return Ok(()),
                }
            } else {
                Duration::ZERO
            };

            self.events.clear();
            match self.poller.wait(&mut self.events, Some(timeout)) {
                Ok(_) => {}
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(error),
            }

            let events = mem::take(&mut self.events);
            for event in &events {
                let mut enqueue = false;

                if let Some(slot) = self.slot_mut(event.key) {
                    let mut active = Interest::NONE;
                    if event.readable {
                        active |= Interest::READ;
                    }
                    if event.writable {
                        active |= Interest::WRITE;
                    }

                    slot.active = active;
                    if !slot.queued {
                        slot.queued = true;
                        enqueue = true;
                    }
                }

                if enqueue {
                    self.ready.push_back(event.key);
                }
            }
            self.events = events;

            // one round over the current queue; More descriptors return to the back and run
            // again on the next iteration, after a zero-timeout poll
            for _ in 0..self.ready.len() {
                let Some(key) = self.ready.pop_front() else {
                    break;
                };

                self.dispatch(key);
            }

            if Instant::now() >= deadline {
                return Ok(());
            }
        }
    }

    fn dispatch(&mut self, key: usize) {
        let (mut descriptor, mut active) = {
            let Some(slot) = self.slot_mut(key) else {
                return;
            };

            let Some(descriptor) = slot.desc.take() else {
                slot.queued = false;
                return;
            };

            (descriptor, slot.active)
        };

        let result = {
            let mut cx = Cx {
                reactor: self,
                token: Token(key),
            };

            descriptor.handle(&mut active, &mut cx)
        };

        let (fd, interest) = {
            let Some(slot) = self.slot_mut(key) else {
                return;
            };

            slot.active = active;
            (slot.fd, slot.interest)
        };

        let mut next = match result {
            Ok(next) => next,
            Err(error) => {
                log::debug!("descriptor {key} failed in handle: {error}");
                Next::Final
            }
        };

        if self.slot(key).is_some_and(|slot| slot.marked_removal) {
            next = Next::Final;
        }

        match next {
            Next::Final => {
                // delete the kernel registration before the descriptor closes its fd
                self.slots[key] = None;
                self.free.push(key);
                let _ = self.poller.delete(fd);
                drop(descriptor);
            }
            Next::Poll => {
                if let Some(slot) = self.slot_mut(key) {
                    slot.queued = false;
                    slot.desc = Some(descriptor);
                }

                if let Err(error) = self.poller.modify(fd, key_event(key, interest)) {
                    log::debug!("descriptor {key} could not be re-armed: {error}");
                    self.remove_key(key);
                }
            }
            Next::More => {
                if let Some(slot) = self.slot_mut(key) {
                    slot.desc = Some(descriptor);
                }

                self.ready.push_back(key);
            }
        }
    }

    fn remove_key(&mut self, key: usize) {
        if let Some(slot) = self.slots.get_mut(key).and_then(Option::take) {
            let _ = self.poller.delete(slot.fd);
            self.free.push(key);
        }
    }

    fn slot(&self, key: usize) -> Option<&Slot> {
        self.slots.get(key).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, key: usize) -> Option<&mut Slot> {
        self.slots.get_mut(key).and_then(Option::as_mut)
    }
}

fn key_event(key: usize, interest: Interest) -> Event {
    Event {
        key,
        readable: interest.contains(Interest::READ),
        writable: interest.contains(Interest::WRITE),
    }
}
