//! A parked channel operation.
//!
//! Each blocked task owns one waiter and sleeps on its condvar. The task on
//! the other side of the channel fills the slot and notifies it; the
//! scheduler halts it when the run ends.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::runtime::scheduler::task::Task;
use crate::runtime::scheduler::{Halt, Interrupt};

enum Slot<T> {
    /// Still parked. A sender keeps the value it offers here.
    Parked(Option<T>),
    /// Resolved. A receiver gets `Some(value)`, or `None` for a close.
    Done(Option<T>),
    /// The run ended while parked.
    Halted(Halt),
}

pub(crate) struct Waiter<T> {
    task: Arc<Task>,
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> Waiter<T> {
    pub(crate) fn sender(
        task: Arc<Task>,
        value: T,
    ) -> Arc<Self> {
        Arc::new(Self {
            task,
            slot: Mutex::new(Slot::Parked(Some(value))),
            ready: Condvar::new(),
        })
    }

    pub(crate) fn receiver(task: Arc<Task>) -> Arc<Self> {
        Arc::new(Self {
            task,
            slot: Mutex::new(Slot::Parked(None)),
            ready: Condvar::new(),
        })
    }

    #[inline]
    pub(crate) fn task(&self) -> &Arc<Task> {
        &self.task
    }

    /// Take the value a parked sender offers and release the sender.
    pub(crate) fn accept(&self) -> Option<T> {
        let mut slot = self.slot.lock();
        let value = match &mut *slot {
            Slot::Parked(value) => value.take(),
            _ => return None,
        };
        *slot = Slot::Done(None);
        self.ready.notify_one();
        value
    }

    /// Resolve a parked receiver with a value, or with `None` for a close.
    pub(crate) fn complete(
        &self,
        value: Option<T>,
    ) {
        let mut slot = self.slot.lock();
        if let Slot::Parked(_) = *slot {
            *slot = Slot::Done(value);
            self.ready.notify_one();
        }
    }

    /// Sleep until resolved or halted.
    pub(crate) fn wait(&self) -> Result<Option<T>, Halt> {
        let mut slot = self.slot.lock();
        loop {
            match std::mem::replace(&mut *slot, Slot::Parked(None)) {
                Slot::Done(value) => return Ok(value),
                Slot::Halted(halt) => return Err(halt),
                parked @ Slot::Parked(_) => {
                    *slot = parked;
                    self.ready.wait(&mut slot);
                }
            }
        }
    }
}

impl<T: Send> Interrupt for Waiter<T> {
    fn interrupt(
        &self,
        halt: Halt,
    ) {
        let mut slot = self.slot.lock();
        if let Slot::Parked(_) = *slot {
            *slot = Slot::Halted(halt);
            self.ready.notify_one();
        }
    }
}
