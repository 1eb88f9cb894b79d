use std::sync::Arc;

use tracing::{info, warn};
use vmprobe_frame::{kind, FrameReader};
use vmprobe_transport::DebugStream;

use crate::message::{Message, MessageFactory};
use crate::session::Shared;

/// The one frame consumer for a session.
///
/// Runs on its dedicated thread until the VM ends the session, the
/// stream fails, or the socket is shut down under it. Either way it
/// closes the session on the way out; there is no path back to running.
pub(crate) struct ReaderLoop<F: MessageFactory> {
    pub frames: FrameReader<DebugStream>,
    pub factory: F,
    pub shared: Arc<Shared<F::Message>>,
}

impl<F: MessageFactory> ReaderLoop<F> {
    pub fn run(mut self) {
        loop {
            let frame = match self.frames.read_frame() {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(error = %err, "read side failed, closing session");
                    self.shared.close();
                    return;
                }
            };

            let msg = match self.factory.decode(frame.kind, frame.payload) {
                Ok(msg) => msg,
                Err(err) => {
                    warn!(error = %err, "undecodable frame, closing session");
                    self.shared.close();
                    return;
                }
            };

            if msg.kind() == kind::IN_EXIT {
                info!("vm ended the debug session");
                self.shared.close();
                return;
            }

            let msg = Arc::new(msg);
            msg.apply(&self.shared.state);
            self.shared.listeners.broadcast(&self.shared.pool, &msg);
            self.shared.mailbox.push(msg);
        }
    }
}
