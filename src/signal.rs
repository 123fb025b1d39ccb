//! Typed change notifications.
//!
//! Every entity that publishes events owns one [`Signal`] per event kind.
//! Observers call [`Signal::connect`] and keep the returned [`Subscription`];
//! dropping the guard disconnects the callback. This replaces implicit
//! signal/slot wiring with explicit, owned connections, so an observer that
//! switches its source (a layer swapping its image, a viewer switching its
//! active layer) simply replaces the guards it holds.
//!
//! # Invariants
//!
//! 1. Callbacks run in connection order.
//! 2. No borrow of the signal is held while a callback runs: callbacks may
//!    connect, disconnect, or emit (re-entrantly) on any signal.
//! 3. A callback disconnected during an emission is not invoked for the
//!    remainder of that emission.
//! 4. `subscriber_count()` is exact; there is no lazy pruning.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type Callback<A> = Rc<dyn Fn(&A)>;

struct Slot<A> {
    id: u64,
    callback: Callback<A>,
}

struct SignalInner<A> {
    slots: Vec<Slot<A>>,
    next_id: u64,
}

/// An owned list of callbacks receiving `&A`.
pub struct Signal<A> {
    inner: Rc<RefCell<SignalInner<A>>>,
}

impl<A: 'static> Default for Signal<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for Signal<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("subscriber_count", &self.inner.borrow().slots.len())
            .finish()
    }
}

impl<A: 'static> Signal<A> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(SignalInner {
                slots: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Connect `callback`. It stays connected until the returned guard is
    /// dropped (or forever, after [`Subscription::detach`]).
    pub fn connect(&self, callback: impl Fn(&A) + 'static) -> Subscription {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.slots.push(Slot {
                id,
                callback: Rc::new(callback),
            });
            id
        };

        let weak: Weak<RefCell<SignalInner<A>>> = Rc::downgrade(&self.inner);
        Subscription {
            disconnect: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.borrow_mut().slots.retain(|slot| slot.id != id);
                }
            })),
        }
    }

    pub fn emit(&self, args: &A) {
        self.emit_while(args, || true);
    }

    /// Deliver `args` to the connected callbacks, checking `keep_going`
    /// before each one. Delivery stops as soon as it returns `false`.
    pub fn emit_while(&self, args: &A, mut keep_going: impl FnMut() -> bool) {
        let snapshot: Vec<(u64, Callback<A>)> = self
            .inner
            .borrow()
            .slots
            .iter()
            .map(|slot| (slot.id, Rc::clone(&slot.callback)))
            .collect();

        for (id, callback) in snapshot {
            if !keep_going() {
                break;
            }
            let still_connected = self.inner.borrow().slots.iter().any(|slot| slot.id == id);
            if still_connected {
                callback(args);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().slots.len()
    }
}

/// RAII connection guard returned by [`Signal::connect`].
#[must_use = "dropping a Subscription disconnects the callback immediately"]
pub struct Subscription {
    disconnect: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Keep the callback connected for the lifetime of the signal.
    pub fn detach(mut self) {
        self.disconnect = None;
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("connected", &self.disconnect.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(disconnect) = self.disconnect.take() {
            disconnect();
        }
    }
}

/// Shared "something in this storage changed" capability.
///
/// Implemented by record storages (journals) and layered images alike, in
/// place of a common mutable base type.
pub trait DataStorage {
    fn on_changed(&self, callback: impl Fn() + 'static) -> Subscription;
    fn notify_changed(&self);
}
