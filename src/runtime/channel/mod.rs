//! Rendezvous channels
//!
//! A [`Channel`] carries values of one type between tasks. With capacity 0
//! every send waits for a receive and the value passes directly from one
//! task to the other; with capacity N the first N unreceived values are
//! buffered. Closing is one-way and wakes every waiting receiver.
//!
//! Every operation takes the calling task's [`TaskContext`] so the scheduler
//! knows who is parked where.

mod waiter;

use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::runtime::scheduler::{FatalError, Halt, TaskContext, TaskRef};
use waiter::Waiter;

static NEXT_CHANNEL_ID: AtomicUsize = AtomicUsize::new(0);

/// Process-unique channel identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ChannelId(pub usize);

impl ChannelId {
    fn next() -> Self {
        Self(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the inner value.
    #[inline]
    pub fn inner(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "Chan({})", self.0)
    }
}

/// Side of a channel a task is blocked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelOp {
    Send,
    Receive,
}

impl std::fmt::Display for ChannelOp {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            ChannelOp::Send => f.write_str("send to"),
            ChannelOp::Receive => f.write_str("receive from"),
        }
    }
}

struct ChannelState<T> {
    buffer: VecDeque<T>,
    senders: VecDeque<Arc<Waiter<T>>>,
    receivers: VecDeque<Arc<Waiter<T>>>,
    closed: bool,
}

struct Inner<T> {
    id: ChannelId,
    capacity: usize,
    state: Mutex<ChannelState<T>>,
}

/// Typed channel handle. Cloning it shares the same channel.
pub struct Channel<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Channel<T> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Channel")
            .field("id", &self.inner.id)
            .field("capacity", &self.inner.capacity)
            .field("buffered", &state.buffer.len())
            .field("senders", &state.senders.len())
            .field("receivers", &state.receivers.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl<T: Send + 'static> Default for Channel<T> {
    fn default() -> Self {
        Self::unbuffered()
    }
}

impl<T: Send + 'static> Channel<T> {
    /// Create a channel; capacity 0 is a rendezvous channel.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: ChannelId::next(),
                capacity,
                state: Mutex::new(ChannelState {
                    buffer: VecDeque::with_capacity(capacity),
                    senders: VecDeque::new(),
                    receivers: VecDeque::new(),
                    closed: false,
                }),
            }),
        }
    }

    /// Create a rendezvous channel.
    #[inline]
    pub fn unbuffered() -> Self {
        Self::new(0)
    }

    /// Create a channel buffering up to `capacity` values.
    #[inline]
    pub fn bounded(capacity: usize) -> Self {
        Self::new(capacity)
    }

    #[inline]
    pub fn id(&self) -> ChannelId {
        self.inner.id
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of buffered values.
    pub fn len(&self) -> usize {
        self.inner.state.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().buffer.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Send a value, parking until a receiver takes it if there is neither a
    /// waiting receiver nor buffer room.
    ///
    /// Sending on a closed channel is fatal for the whole run.
    pub fn send(
        &self,
        cx: &TaskContext,
        value: T,
    ) -> Result<(), Halt> {
        let shared = cx.shared();
        let mut state = self.inner.state.lock();
        shared.ensure_running()?;

        if state.closed {
            return Err(shared.fail(
                Some(cx.id()),
                FatalError::ClosedChannelSend {
                    task: cx.task_ref(),
                    channel: self.id(),
                },
            ));
        }

        if let Some(receiver) = state.receivers.pop_front() {
            shared.unpark(receiver.task().id())?;
            receiver.complete(Some(value));
            shared.stats.record_handoff();
            debug!(
                task = %cx.id(),
                channel = %self.id(),
                receiver = %receiver.task().id(),
                "handed value to parked receiver"
            );
            return Ok(());
        }

        if state.buffer.len() < self.inner.capacity {
            state.buffer.push_back(value);
            shared.stats.record_buffered();
            return Ok(());
        }

        let waiter = Waiter::sender(cx.task().clone(), value);
        state.senders.push_back(waiter.clone());
        if let Err(halt) = shared.park(cx.task(), self.id(), ChannelOp::Send, waiter.clone()) {
            state.senders.pop_back();
            return Err(halt);
        }
        drop(state);

        waiter.wait().map(|_| ())
    }

    /// Receive a value. Returns `Ok(None)` once the channel is closed and
    /// drained, as many times as it is called.
    pub fn recv(
        &self,
        cx: &TaskContext,
    ) -> Result<Option<T>, Halt> {
        let shared = cx.shared();
        let mut state = self.inner.state.lock();
        shared.ensure_running()?;

        if let Some(value) = state.buffer.pop_front() {
            // The freed slot goes to the oldest parked sender.
            if let Some(sender) = state.senders.pop_front() {
                shared.unpark(sender.task().id())?;
                if let Some(next) = sender.accept() {
                    state.buffer.push_back(next);
                }
            }
            return Ok(Some(value));
        }

        while let Some(sender) = state.senders.pop_front() {
            shared.unpark(sender.task().id())?;
            if let Some(value) = sender.accept() {
                shared.stats.record_handoff();
                debug!(
                    task = %cx.id(),
                    channel = %self.id(),
                    sender = %sender.task().id(),
                    "took value from parked sender"
                );
                return Ok(Some(value));
            }
        }

        if state.closed {
            return Ok(None);
        }

        let waiter = Waiter::receiver(cx.task().clone());
        state.receivers.push_back(waiter.clone());
        if let Err(halt) = shared.park(cx.task(), self.id(), ChannelOp::Receive, waiter.clone()) {
            state.receivers.pop_back();
            return Err(halt);
        }
        drop(state);

        waiter.wait()
    }

    /// Close the channel and release every parked receiver.
    ///
    /// Closing twice is fatal. Closing while senders are parked is fatal
    /// for the oldest of them, since its send can never complete.
    pub fn close(
        &self,
        cx: &TaskContext,
    ) -> Result<(), Halt> {
        let shared = cx.shared();
        let mut state = self.inner.state.lock();
        shared.ensure_running()?;

        if state.closed {
            return Err(shared.fail(
                Some(cx.id()),
                FatalError::DoubleClose {
                    task: cx.task_ref(),
                    channel: self.id(),
                },
            ));
        }
        state.closed = true;
        debug!(task = %cx.id(), channel = %self.id(), "channel closed");

        if let Some(sender) = state.senders.front() {
            shared.fail(
                Some(sender.task().id()),
                FatalError::ClosedChannelSend {
                    task: TaskRef::from(sender.task().as_ref()),
                    channel: self.id(),
                },
            );
            return Err(shared.halt());
        }

        for receiver in std::mem::take(&mut state.receivers) {
            shared.unpark(receiver.task().id())?;
            receiver.complete(None);
        }
        Ok(())
    }
}
