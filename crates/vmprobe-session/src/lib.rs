//! Debug session engine for the VM wire protocol.
//!
//! One [`Session`] owns one TCP connection to a script VM. A dedicated
//! reader thread decodes inbound frames, applies each message's local
//! effect to the shared [`SessionState`], fans the message out to
//! registered listeners, and parks it in the correlation [`Mailbox`]
//! until a waiter (or a drop token) consumes it.
//!
//! Any number of threads may send commands concurrently; the send path
//! is serialized, and a command addressed to a different isolate than
//! the active one gets a switch frame injected immediately before it.
//!
//! The concrete message catalog lives with the command layer: callers
//! supply a [`MessageFactory`] for decoding and [`Outbound`]
//! implementations for sending.

pub mod error;
pub mod listeners;
pub mod mailbox;
pub mod message;
pub mod pool;
mod reader;
pub mod session;
pub mod state;

pub use error::{Result, SessionError};
pub use listeners::MessageListener;
pub use mailbox::Mailbox;
pub use message::{Interest, Message, MessageFactory, Outbound};
pub use pool::WorkerPool;
pub use session::{Session, SessionConfig};
pub use state::{SessionState, DEFAULT_ISOLATE_ID, RESPONSE_TIMEOUT};
