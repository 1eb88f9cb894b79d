/// Errors that can occur in a debug session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] vmprobe_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] vmprobe_frame::FrameError),

    /// An I/O error outside the framed stream (thread spawn, socket setup).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection is closed; no further messages will arrive.
    /// Closure discards every unconsumed buffered message.
    #[error("disconnected")]
    Disconnected,

    /// The factory could not produce a message for a wire frame.
    #[error("cannot decode message kind {kind:#04x}: {reason}")]
    Decode { kind: u32, reason: String },
}

pub type Result<T> = std::result::Result<T, SessionError>;
