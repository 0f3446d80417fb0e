use crate::envelope::TaskId;
use std::{
    collections::HashMap,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

/// What a waiter gets back from [`DeliveryTable::wait`].
#[derive(Debug, PartialEq)]
pub enum Awaited<T> {
    /// The value resolved for the awaited id. Handed out exactly once.
    Ready(T),
    /// The timeout elapsed before the id was resolved, or the id was never
    /// issued and the table has been closed.
    TimedOut,
    /// The id was issued but its value is gone: it was claimed before, or it
    /// stayed unclaimed past the retention period and was discarded.
    AlreadyConsumed,
}

impl<T> Awaited<T> {
    /// Returns the resolved value, if any.
    pub fn ready(self) -> Option<T> {
        match self {
            Awaited::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// Maps the resolved value, keeping `TimedOut` and `AlreadyConsumed` as they are.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Awaited<U> {
        match self {
            Awaited::Ready(value) => Awaited::Ready(f(value)),
            Awaited::TimedOut => Awaited::TimedOut,
            Awaited::AlreadyConsumed => Awaited::AlreadyConsumed,
        }
    }
}

/// What happened to a value handed to [`DeliveryTable::resolve`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Stored in the slot; waiters have been woken up.
    Stored,
    /// The slot was already resolved; the new value was dropped.
    Duplicate,
    /// No slot exists for the id; the value was dropped.
    Unregistered,
}

enum Slot<T> {
    Pending,
    Ready { value: T, resolved_at: Instant },
}

struct Slots<T> {
    entries: HashMap<TaskId, Slot<T>>,
    last_issued: u64,
    closed: bool,
}

/// Maps every issued [`TaskId`] to a single-resolution slot.
///
/// The submitting side issues an id (creating a pending slot), the worker
/// resolves it once, and whoever waits on that id takes the value out. Waiters
/// never see values resolved for other ids, so any number of them can wait
/// concurrently without stealing each other's results.
pub struct DeliveryTable<T> {
    slots: Mutex<Slots<T>>,
    resolved: Condvar,
    unclaimed_ttl: Duration,
}

impl<T> DeliveryTable<T> {
    /// Creates an empty table. Resolved values nobody claims within
    /// `unclaimed_ttl` are dropped by [`DeliveryTable::sweep`].
    pub fn new(unclaimed_ttl: Duration) -> Self {
        Self {
            slots: Mutex::new(Slots {
                entries: HashMap::new(),
                last_issued: 0,
                closed: false,
            }),
            resolved: Condvar::new(),
            unclaimed_ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots<T>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issues the next id and opens a pending slot for it.
    ///
    /// Ids are issued even after [`DeliveryTable::close`]; the caller decides
    /// whether the work behind them can still run.
    pub fn issue(&self) -> TaskId {
        let mut slots = self.lock();
        slots.last_issued += 1;
        let id = TaskId::new(slots.last_issued);
        slots.entries.insert(id, Slot::Pending);
        id
    }

    /// Marks the table as closed: ids not issued by now never will be.
    ///
    /// Waiters on such ids are woken up and get [`Awaited::TimedOut`] instead
    /// of waiting for an id that cannot arrive. Issued ids are unaffected.
    pub fn close(&self) {
        self.lock().closed = true;
        self.resolved.notify_all();
    }

    /// Returns true once [`DeliveryTable::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Drops a slot that will never be resolved, e.g. because enqueueing failed.
    pub fn cancel(&self, id: TaskId) {
        self.lock().entries.remove(&id);
    }

    /// Stores the value for `id` and wakes the waiters.
    pub fn resolve(&self, id: TaskId, value: T) -> Delivery {
        let mut slots = self.lock();
        match slots.entries.get_mut(&id) {
            None => {
                log::error!("No one is registered for result {id}, dropping it");
                Delivery::Unregistered
            }
            Some(Slot::Ready { .. }) => {
                log::error!("Result {id} was already resolved, dropping the duplicate");
                Delivery::Duplicate
            }
            Some(slot) => {
                *slot = Slot::Ready {
                    value,
                    resolved_at: Instant::now(),
                };
                self.resolved.notify_all();
                Delivery::Stored
            }
        }
    }

    /// Blocks until `id` is resolved, the timeout elapses, or the id turns out
    /// to be already consumed. `None` waits without a deadline.
    ///
    /// Ids that were never issued are waited on like pending ones, since they
    /// may still be issued later. Once the table is closed they resolve to
    /// [`Awaited::TimedOut`] right away.
    pub fn wait(&self, id: TaskId, timeout: Option<Duration>) -> Awaited<T> {
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let mut slots = self.lock();
        loop {
            match slots.entries.get(&id) {
                Some(Slot::Ready { .. }) => {
                    if let Some(Slot::Ready { value, .. }) = slots.entries.remove(&id) {
                        return Awaited::Ready(value);
                    }
                }
                None if id.as_u64() <= slots.last_issued => return Awaited::AlreadyConsumed,
                None if slots.closed => return Awaited::TimedOut,
                _ => {}
            }

            slots = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Awaited::TimedOut;
                    }
                    self.resolved
                        .wait_timeout(slots, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .resolved
                    .wait(slots)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    /// Discards resolved values that stayed unclaimed longer than the
    /// retention period. Returns how many were dropped.
    pub fn sweep(&self, now: Instant) -> usize {
        let ttl = self.unclaimed_ttl;
        let mut slots = self.lock();
        let before = slots.entries.len();
        slots.entries.retain(|id, slot| match slot {
            Slot::Ready { resolved_at, .. } => {
                let age = now.saturating_duration_since(*resolved_at);
                if age >= ttl {
                    log::warn!("Discarding unclaimed result {id} after {age:?}");
                    false
                } else {
                    true
                }
            }
            Slot::Pending => true,
        });
        before - slots.entries.len()
    }

    /// Number of issued ids still waiting for their value.
    pub fn pending(&self) -> usize {
        self.lock()
            .entries
            .values()
            .filter(|slot| matches!(slot, Slot::Pending))
            .count()
    }

    /// Number of resolved values nobody has claimed yet.
    pub fn unclaimed(&self) -> usize {
        self.lock()
            .entries
            .values()
            .filter(|slot| matches!(slot, Slot::Ready { .. }))
            .count()
    }
}
