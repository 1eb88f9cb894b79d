use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::{Result, SessionError};
use crate::message::{Interest, Message};

/// Correlation store for unconsumed inbound messages.
///
/// Solicited replies and unsolicited events arrive interleaved on the
/// same stream. The reader thread appends everything here; callers that
/// just sent a command block in [`Mailbox::take`] until the reply they
/// want shows up, while unrelated messages stay buffered for whoever
/// asked for those.
///
/// A drop token ([`Mailbox::drop_next`]) marks one expected reply as
/// uninteresting: the next arriving message it matches is discarded
/// instead of delivered, so it cannot starve a later waiter for the
/// same kind.
///
/// Each message leaves the store at most once — taken by a waiter,
/// eaten by a drop token, or cleared on close.
pub struct Mailbox<M> {
    inner: Mutex<Inner<M>>,
    available: Condvar,
}

struct Inner<M> {
    backlog: VecDeque<Arc<M>>,
    drops: Vec<Interest>,
    closed: bool,
}

impl<M: Message> Inner<M> {
    /// One pass over the backlog in arrival order.
    ///
    /// Drop tokens are checked first for every candidate: a match
    /// consumes both the candidate and the token, and the scan resumes
    /// at the same slot (the removal shifted the next candidate into
    /// it). Only candidates that survive the tokens are offered to the
    /// waiter's interest.
    fn scan(&mut self, interest: Interest) -> Option<Arc<M>> {
        let mut i = 0;
        'candidates: while i < self.backlog.len() {
            let kind = self.backlog[i].kind();
            for d in 0..self.drops.len() {
                if self.drops[d].matches(kind) {
                    self.backlog.remove(i);
                    self.drops.remove(d);
                    continue 'candidates;
                }
            }
            if interest.matches(kind) {
                return self.backlog.remove(i);
            }
            i += 1;
        }
        None
    }
}

impl<M: Message> Mailbox<M> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                backlog: VecDeque::new(),
                drops: Vec::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<M>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a message and wake every blocked retrieval.
    pub fn push(&self, msg: Arc<M>) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        inner.backlog.push_back(msg);
        drop(inner);
        self.available.notify_all();
    }

    /// Register a one-shot drop token: the next arriving message
    /// matching `interest` is silently discarded instead of delivered.
    pub fn drop_next(&self, interest: Interest) {
        self.lock().drops.push(interest);
    }

    /// Remove a specific buffered message by identity, consuming no
    /// token. Returns whether it was present.
    pub fn discard(&self, msg: &Arc<M>) -> bool {
        let mut inner = self.lock();
        let before = inner.backlog.len();
        inner.backlog.retain(|m| !Arc::ptr_eq(m, msg));
        before != inner.backlog.len()
    }

    /// Snapshot of the current backlog in arrival order.
    pub fn snapshot(&self) -> Vec<Arc<M>> {
        self.lock().backlog.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().backlog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().backlog.is_empty()
    }

    /// Close the store: discard the backlog and fail every blocked and
    /// future retrieval with `Disconnected`. Idempotent.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.backlog.clear();
        drop(inner);
        self.available.notify_all();
    }

    /// Block until a message matching `interest` arrives, in arrival
    /// order, removing it from the store.
    ///
    /// Fails with `Disconnected` if the store is closed before a match.
    pub fn take(&self, interest: Interest) -> Result<Arc<M>> {
        match self.take_deadline(interest, None)? {
            Some(msg) => Ok(msg),
            // Unreachable without a deadline; the scan loop only exits
            // with a message or on closure.
            None => Err(SessionError::Disconnected),
        }
    }

    /// Bounded variant of [`Mailbox::take`]: returns `Ok(None)` if the
    /// timeout elapses with no match. A missing reply within a bound is
    /// an answer, not a failure.
    pub fn take_timeout(&self, interest: Interest, timeout: Duration) -> Result<Option<Arc<M>>> {
        self.take_deadline(interest, Some(Instant::now() + timeout))
    }

    fn take_deadline(
        &self,
        interest: Interest,
        deadline: Option<Instant>,
    ) -> Result<Option<Arc<M>>> {
        let mut inner = self.lock();
        loop {
            if let Some(msg) = inner.scan(interest) {
                return Ok(Some(msg));
            }
            if inner.closed {
                return Err(SessionError::Disconnected);
            }
            // Block until a push or close signals, then rescan. Every
            // wake rechecks the predicate, spurious or not.
            match deadline {
                None => {
                    inner = self
                        .available
                        .wait(inner)
                        .unwrap_or_else(|e| e.into_inner());
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    let (guard, _) = self
                        .available
                        .wait_timeout(inner, deadline - now)
                        .unwrap_or_else(|e| e.into_inner());
                    inner = guard;
                }
            }
        }
    }
}

impl<M: Message> Default for Mailbox<M> {
    fn default() -> Self {
        Self::new()
    }
}
