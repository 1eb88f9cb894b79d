//! TCP transport for the vmprobe debugger wire engine.
//!
//! A debug session rides a single persistent TCP connection between the
//! debugger and the script VM. Two ways to obtain one:
//! - [`DebugListener`]: bind and wait for the VM to dial in (the usual
//!   arrangement — the VM connects out to the debug port on startup).
//! - [`DebugStream::connect`]: dial a VM that is already listening.
//!
//! This is the lowest layer of vmprobe. Everything else builds on top of
//! the [`DebugStream`] type provided here.

pub mod error;
pub mod stream;

pub use error::{Result, TransportError};
pub use stream::{DebugListener, DebugStream, DEFAULT_DEBUG_PORT};
