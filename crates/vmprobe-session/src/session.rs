use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info};
use vmprobe_frame::{kind, FrameConfig, FrameReader, FrameWriter};
use vmprobe_transport::DebugStream;

use crate::error::Result;
use crate::listeners::{deliver, ListenerSet, MessageListener};
use crate::mailbox::Mailbox;
use crate::message::{Interest, Message, MessageFactory, Outbound};
use crate::pool::WorkerPool;
use crate::reader::ReaderLoop;
use crate::state::{SessionState, RESPONSE_TIMEOUT};

/// Tuning knobs for a debug session.
pub struct SessionConfig {
    /// Frame codec limits and socket timeouts.
    pub frame: FrameConfig,
    /// Number of listener delivery workers.
    pub delivery_workers: usize,
    /// Reply wait used by [`Session::request_default_timeout`].
    pub response_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            delivery_workers: 10,
            response_timeout: RESPONSE_TIMEOUT,
        }
    }
}

/// Everything the reader thread and the session handle both touch.
pub(crate) struct Shared<M: Message> {
    pub state: SessionState,
    pub mailbox: Mailbox<M>,
    pub listeners: ListenerSet<M>,
    pub pool: WorkerPool,
    stream: DebugStream,
}

impl<M: Message> Shared<M> {
    /// Best-effort teardown of both socket halves, each independently;
    /// failures ignored. Idempotent and safe from any thread.
    pub fn disconnect(&self) {
        self.stream.shutdown_read();
        self.stream.shutdown_write();
    }

    /// Mark the session closed, discard the backlog, fail every blocked
    /// and future retrieval, release the socket.
    pub fn close(&self) {
        if self.state.mark_closed() {
            debug!("session closed");
        }
        self.mailbox.close();
        self.disconnect();
    }
}

/// A live debug session over one TCP connection to a script VM.
///
/// Owns the reader thread, the correlation [`Mailbox`], the listener
/// set with its delivery pool, and the serialized send path with
/// isolate routing. Single-use: once closed it cannot be reconnected.
pub struct Session<F: MessageFactory> {
    shared: Arc<Shared<F::Message>>,
    writer: Mutex<FrameWriter<DebugStream>>,
    response_timeout: Duration,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl<F: MessageFactory> Session<F> {
    /// Start a session with default configuration.
    pub fn start(stream: DebugStream, factory: F) -> Result<Self> {
        Self::start_with_config(stream, factory, SessionConfig::default())
    }

    /// Start a session: split the stream, spawn the reader thread, and
    /// stand up the delivery pool.
    pub fn start_with_config(
        stream: DebugStream,
        factory: F,
        config: SessionConfig,
    ) -> Result<Self> {
        let reader_stream = stream.try_clone()?;
        let lifecycle_stream = stream.try_clone()?;

        let frames = FrameReader::with_config_stream(reader_stream, config.frame.clone())?;
        let writer = FrameWriter::with_config_stream(stream, config.frame)?;

        let shared = Arc::new(Shared {
            state: SessionState::new(),
            mailbox: Mailbox::new(),
            listeners: ListenerSet::new(),
            pool: WorkerPool::new(config.delivery_workers)?,
            stream: lifecycle_stream,
        });

        let reader = ReaderLoop {
            frames,
            factory,
            shared: Arc::clone(&shared),
        };
        let handle = std::thread::Builder::new()
            .name("vmprobe-reader".into())
            .spawn(move || reader.run())?;

        info!("debug session started");
        Ok(Self {
            shared,
            writer: Mutex::new(writer),
            response_timeout: config.response_timeout,
            reader: Mutex::new(Some(handle)),
        })
    }

    /// Shared session facts (version, options, active isolate...).
    pub fn state(&self) -> &SessionState {
        &self.shared.state
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.is_closed()
    }

    fn writer_lock(&self) -> MutexGuard<'_, FrameWriter<DebugStream>> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Send one command, switching the active isolate first if the
    /// command is addressed elsewhere.
    ///
    /// The switch frame and the command frame go out back to back under
    /// the same send lock; no other sender's frame can land between
    /// them. A send failure surfaces here and leaves closure decisions
    /// to the read side.
    pub fn send(&self, out: &impl Outbound) -> Result<()> {
        let mut writer = self.writer_lock();
        if out.kind() != kind::OUT_SET_ACTIVE_ISOLATE {
            let target = out.target_isolate();
            if target != self.shared.state.active_isolate() {
                debug!(target, "isolate mismatch, switching");
                self.shared.state.set_active_isolate(target);
                writer.send(kind::OUT_SET_ACTIVE_ISOLATE, &target.to_le_bytes())?;
            }
        }
        writer.send(out.kind(), &out.encode())?;
        Ok(())
    }

    /// Block until a message matching `interest` arrives, in arrival
    /// order. Fails with `Disconnected` once the session closes.
    pub fn recv(&self, interest: Interest) -> Result<Arc<F::Message>> {
        self.shared.mailbox.take(interest)
    }

    /// Bounded wait; `Ok(None)` when the timeout lapses with no match.
    pub fn recv_timeout(
        &self,
        interest: Interest,
        timeout: Duration,
    ) -> Result<Option<Arc<F::Message>>> {
        self.shared.mailbox.take_timeout(interest, timeout)
    }

    /// Send a command and block for its reply.
    pub fn request(&self, out: &impl Outbound, reply: Interest) -> Result<Arc<F::Message>> {
        self.send(out)?;
        self.recv(reply)
    }

    /// Send a command and wait for its reply with an explicit bound.
    pub fn request_timeout(
        &self,
        out: &impl Outbound,
        reply: Interest,
        timeout: Duration,
    ) -> Result<Option<Arc<F::Message>>> {
        self.send(out)?;
        self.recv_timeout(reply, timeout)
    }

    /// Send a command and wait for its reply for the configured default
    /// (750 ms unless overridden in [`SessionConfig`]).
    pub fn request_default_timeout(
        &self,
        out: &impl Outbound,
        reply: Interest,
    ) -> Result<Option<Arc<F::Message>>> {
        self.request_timeout(out, reply, self.response_timeout)
    }

    /// Send a command whose reply is expected but uninteresting: the
    /// next matching inbound message is silently discarded instead of
    /// lingering in the backlog where it would starve a later waiter.
    pub fn send_ignore_reply(&self, out: &impl Outbound, reply: Interest) -> Result<()> {
        self.send(out)?;
        self.shared.mailbox.drop_next(reply);
        Ok(())
    }

    /// Register a drop token without sending anything.
    pub fn drop_next(&self, reply: Interest) {
        self.shared.mailbox.drop_next(reply);
    }

    /// Remove a specific buffered message without consuming any token.
    pub fn discard(&self, msg: &Arc<F::Message>) -> bool {
        self.shared.mailbox.discard(msg)
    }

    /// Register a listener. The current backlog is replayed to it in
    /// arrival order on the delivery workers, then it joins the active
    /// set for live broadcasts.
    pub fn add_listener(&self, listener: Arc<dyn MessageListener<F::Message>>) {
        for msg in self.shared.mailbox.snapshot() {
            if listener.interest().matches(msg.kind()) {
                let listener = Arc::clone(&listener);
                self.shared.pool.execute(move || deliver(&listener, msg));
            }
        }
        self.shared.listeners.add(listener);
    }

    /// Remove a listener by identity. Deliveries already scheduled for
    /// it still run.
    pub fn remove_listener(&self, listener: &Arc<dyn MessageListener<F::Message>>) {
        self.shared.listeners.remove(listener);
    }

    /// Best-effort socket teardown; idempotent, callable from any
    /// thread, including while the reader is mid-read.
    pub fn disconnect(&self) {
        self.shared.disconnect();
    }

    /// Tear down the session: close the socket, fail blocked waiters,
    /// and join the reader thread.
    pub fn shutdown(&self) {
        self.shared.close();
        let handle = self
            .reader
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl<F: MessageFactory> Drop for Session<F> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
