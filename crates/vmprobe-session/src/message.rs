use bytes::Bytes;

use crate::error::Result;
use crate::state::SessionState;

/// Explicit tag filter for inbound message matching.
///
/// `Any` accepts every message (the root of the catalog); `Kind`
/// accepts one exact wire type code. Listeners, waiters, and drop
/// tokens all match through this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    /// Accept every inbound message.
    Any,
    /// Accept messages with exactly this wire type code.
    Kind(u32),
}

impl Interest {
    /// Whether a message with the given type code is accepted.
    pub fn matches(self, kind: u32) -> bool {
        match self {
            Interest::Any => true,
            Interest::Kind(k) => k == kind,
        }
    }
}

/// An inbound debug protocol message.
///
/// Implemented by the command layer's catalog; the engine only needs
/// the tag and the local effect.
pub trait Message: Send + Sync + 'static {
    /// The wire type code of this message.
    fn kind(&self) -> u32;

    /// Immediate local effect of receiving this message.
    ///
    /// Runs exactly once, on the reader thread, before the message is
    /// dispatched to listeners or parked for waiters.
    fn apply(&self, _state: &SessionState) {}
}

/// Decodes wire frames into catalog messages.
///
/// Must at least produce the exit sentinel
/// ([`vmprobe_frame::kind::IN_EXIT`]) and whatever request/response
/// pairs the command layer exercises (e.g. process-tag requests
/// answered by processed-tag replies).
pub trait MessageFactory: Send + 'static {
    type Message: Message;

    fn decode(&self, kind: u32, payload: Bytes) -> Result<Self::Message>;
}

/// An outbound command addressed to one isolate.
pub trait Outbound {
    /// The wire type code.
    fn kind(&self) -> u32;

    /// The isolate this command is addressed to.
    fn target_isolate(&self) -> i32;

    /// Payload encoding. Called once per send, at send time.
    fn encode(&self) -> Bytes;
}
