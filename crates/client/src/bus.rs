//! Notification bus: delivers feed snapshots to registered listeners.
//!
//! Listeners run synchronously, in registration order, on the thread that
//! changed the feed. A listener may subscribe or unsubscribe (itself or
//! others) while being notified. A panicking listener is logged and the
//! remaining listeners still run.

use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use crate::stores::FeedSnapshot;

pub type Listener = Rc<dyn Fn(&FeedSnapshot)>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

impl Registry {
    fn contains(&self, id: u64) -> bool {
        self.listeners.iter().any(|(existing, _)| *existing == id)
    }
}

/// Handle returned by [`NotificationBus::subscribe`].
///
/// Dropping it keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[must_use = "dropping a Subscription leaves the listener registered forever"]
pub struct Subscription {
    id: u64,
    registry: Weak<RefCell<Registry>>,
}

impl Subscription {
    /// Remove exactly the listener this handle was created for. Returns
    /// false if it was already gone or the bus no longer exists.
    pub fn unsubscribe(self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut registry = registry.borrow_mut();
        let before = registry.listeners.len();
        registry.listeners.retain(|(id, _)| *id != self.id);
        registry.listeners.len() != before
    }
}

#[derive(Clone, Default)]
pub struct NotificationBus {
    registry: Rc<RefCell<Registry>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` and immediately deliver `current` to it.
    pub fn subscribe(
        &self,
        listener: impl Fn(&FeedSnapshot) + 'static,
        current: &FeedSnapshot,
    ) -> Subscription {
        let listener: Listener = Rc::new(listener);
        let id = {
            let mut registry = self.registry.borrow_mut();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.listeners.push((id, listener.clone()));
            id
        };

        invoke(id, &listener, current);

        Subscription {
            id,
            registry: Rc::downgrade(&self.registry),
        }
    }

    /// Deliver `snapshot` to every registered listener.
    pub fn publish(&self, snapshot: &FeedSnapshot) {
        let listeners: Vec<(u64, Listener)> = self.registry.borrow().listeners.clone();

        for (id, listener) in listeners {
            // Skip listeners removed by an earlier listener in this round.
            if !self.registry.borrow().contains(id) {
                continue;
            }
            invoke(id, &listener, snapshot);
        }
    }

    pub fn len(&self) -> usize {
        self.registry.borrow().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn invoke(id: u64, listener: &Listener, snapshot: &FeedSnapshot) {
    if catch_unwind(AssertUnwindSafe(|| listener(snapshot))).is_err() {
        crate::log_error!("Feed listener {} panicked; continuing with the rest", id);
    }
}
