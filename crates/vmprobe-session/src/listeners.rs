use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use tracing::error;

use crate::message::{Interest, Message};
use crate::pool::WorkerPool;

/// Receives inbound messages it declared interest in.
///
/// Implementations run on the session's delivery workers, never on the
/// reader thread. A returned error (or a panic) is logged and contained;
/// it does not affect other listeners, waiters, or the connection.
pub trait MessageListener<M>: Send + Sync {
    /// The message tag(s) this listener accepts.
    fn interest(&self) -> Interest;

    /// Handle one message.
    fn on_message(&self, msg: Arc<M>) -> std::result::Result<(), Box<dyn std::error::Error>>;
}

/// The active listener set. Unordered; identity-keyed.
pub(crate) struct ListenerSet<M> {
    active: Mutex<Vec<Arc<dyn MessageListener<M>>>>,
}

impl<M: Message> ListenerSet<M> {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, listener: Arc<dyn MessageListener<M>>) {
        self.lock().push(listener);
    }

    /// Remove by identity. Already-scheduled deliveries for the listener
    /// are not cancelled.
    pub fn remove(&self, listener: &Arc<dyn MessageListener<M>>) {
        self.lock().retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Schedule one delivery task per active listener. Each task is an
    /// independent unit of work; nothing orders deliveries across
    /// different listeners.
    pub fn broadcast(&self, pool: &WorkerPool, msg: &Arc<M>) {
        let active = self.lock().clone();
        for listener in active {
            let msg = Arc::clone(msg);
            pool.execute(move || deliver(&listener, msg));
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn MessageListener<M>>>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Run one listener delivery, containing errors and panics.
pub(crate) fn deliver<M: Message>(listener: &Arc<dyn MessageListener<M>>, msg: Arc<M>) {
    if !listener.interest().matches(msg.kind()) {
        return;
    }
    let kind = msg.kind();
    match catch_unwind(AssertUnwindSafe(|| listener.on_message(msg))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(kind, error = %err, "listener failed to handle message"),
        Err(_) => error!(kind, "listener panicked while handling message"),
    }
}
