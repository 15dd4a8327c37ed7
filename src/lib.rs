//!
//! Facade crate for the sculk protocol stack. Re-exports the member crates so that applications
//! can depend on a single name:
//!
//! * [`stream`]: blocking-style byte stream abstractions
//! * [`protocol`]: wire codec primitives (varints, scalars, strings, arrays)
//! * [`nbt`]: the tagged binary format, including the SAX-style compound reader
//! * [`chat`]: chat components and their JSON reader/writer
//! * [`reactor`]: the single-threaded I/O multiplexer and idle-task executor
//! * [`net`]: packet framing and the non-blocking write queue

pub use sculk_chat as chat;
pub use sculk_nbt as nbt;
pub use sculk_net as net;
pub use sculk_protocol as protocol;
pub use sculk_reactor as reactor;
pub use sculk_stream as stream;
