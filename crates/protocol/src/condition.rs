use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

type Callback = Box<dyn FnOnce()>;

#[derive(Default)]
struct Slot {
    callback: Option<Callback>,
    generation: u64,
}

/// Single-waiter wakeup primitive.
///
/// At most one callback may be parked at a time; [`signal`](Condition::signal)
/// consumes and runs it synchronously. Signalling with no waiter is a no-op,
/// so a producer can signal unconditionally whenever its condition becomes
/// true. This is deliberately not a semaphore: there is no counting and no
/// queue of waiters.
///
/// Handles are cheap clones sharing one slot, which lets a state machine
/// expose its resume condition to an owner running on the same thread.
#[derive(Clone, Default)]
pub struct Condition {
    slot: Rc<RefCell<Slot>>,
}

impl Condition {
    /// Creates a condition with no parked waiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the parked callback, if any.
    ///
    /// The slot is emptied before the callback runs, so the callback may
    /// immediately park a successor on the same condition.
    pub fn signal(&self) {
        let callback = self.slot.borrow_mut().callback.take();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Parks `callback` until the next [`signal`](Condition::signal).
    ///
    /// The returned handle cancels this wait specifically: cancelling after
    /// the wake has fired, or after a newer wait replaced this one, is a
    /// no-op.
    ///
    /// # Panics
    ///
    /// Panics if a callback is already parked; the primitive is
    /// single-waiter by contract.
    pub fn wait<F: FnOnce() + 'static>(&self, callback: F) -> WaitHandle {
        let mut slot = self.slot.borrow_mut();
        assert!(
            slot.callback.is_none(),
            "condition already has a parked waiter"
        );
        slot.generation += 1;
        slot.callback = Some(Box::new(callback));
        WaitHandle {
            slot: Rc::clone(&self.slot),
            generation: slot.generation,
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("waiting", &self.slot.borrow().callback.is_some())
            .finish()
    }
}

/// Cancellation handle returned by [`Condition::wait`].
pub struct WaitHandle {
    slot: Rc<RefCell<Slot>>,
    generation: u64,
}

impl WaitHandle {
    /// Discards the parked callback if this wait is still pending.
    pub fn cancel(self) {
        let mut slot = self.slot.borrow_mut();
        if slot.generation == self.generation {
            slot.callback = None;
        }
    }
}

impl fmt::Debug for WaitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitHandle")
            .field("generation", &self.generation)
            .finish()
    }
}
