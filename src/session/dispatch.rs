// Routes object callbacks to the closures that asked for them
// Each subscription captures exactly the state it needs; no user-data pointers

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::error::Error;
use crate::provider::{HandleId, ObjectEvent};

type Callback = dyn FnMut(&ObjectEvent) -> Result<(), Error>;

#[derive(Default)]
struct Routes {
    next_id: u64,
    by_target: HashMap<HandleId, Vec<(u64, Rc<RefCell<Callback>>)>>,
}

/// Outcome of routing a single object event.
#[derive(Debug, Default)]
pub struct Delivery {
    pub invoked: usize,
    pub failures: Vec<Error>,
}

#[derive(Clone, Default)]
pub struct Dispatcher {
    routes: Rc<RefCell<Routes>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for events on `target`. The registration lives as
    /// long as the returned guard.
    pub fn subscribe<F>(&self, target: HandleId, callback: F) -> Subscription
    where
        F: FnMut(&ObjectEvent) -> Result<(), Error> + 'static,
    {
        let mut routes = self.routes.borrow_mut();
        routes.next_id += 1;
        let id = routes.next_id;
        let callback: Rc<RefCell<Callback>> = Rc::new(RefCell::new(callback));
        routes.by_target.entry(target).or_default().push((id, callback));
        trace!(handle = %target, subscription = id, "subscribed");

        Subscription {
            routes: Rc::downgrade(&self.routes),
            target,
            id,
        }
    }

    pub fn subscriber_count(&self, target: HandleId) -> usize {
        self.routes
            .borrow()
            .by_target
            .get(&target)
            .map_or(0, Vec::len)
    }

    /// Invokes every callback registered for `target`, in registration order.
    ///
    /// The routing table is not borrowed while callbacks run, so a callback
    /// may subscribe or drop subscriptions freely. A callback dropped by an
    /// earlier one in the same delivery still runs; its own bound-handle check
    /// turns that into a stale no-op.
    pub fn dispatch(&self, target: HandleId, event: &ObjectEvent) -> Delivery {
        let callbacks: Vec<Rc<RefCell<Callback>>> = match self.routes.borrow().by_target.get(&target) {
            Some(entries) => entries.iter().map(|(_, cb)| Rc::clone(cb)).collect(),
            None => return Delivery::default(),
        };

        let mut delivery = Delivery::default();
        for callback in callbacks {
            let Ok(mut running) = callback.try_borrow_mut() else {
                continue;
            };
            delivery.invoked += 1;
            if let Err(err) = (&mut *running)(event) {
                delivery.failures.push(err);
            }
        }
        delivery
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let routes = self.routes.borrow();
        f.debug_struct("Dispatcher")
            .field("targets", &routes.by_target.len())
            .finish()
    }
}

/// Keeps a callback registered; dropping it unsubscribes.
pub struct Subscription {
    routes: Weak<RefCell<Routes>>,
    target: HandleId,
    id: u64,
}

impl Subscription {
    pub fn target(&self) -> HandleId {
        self.target
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(routes) = self.routes.upgrade() else {
            return;
        };
        let Ok(mut routes) = routes.try_borrow_mut() else {
            return;
        };
        if let Some(entries) = routes.by_target.get_mut(&self.target) {
            entries.retain(|(id, _)| *id != self.id);
            if entries.is_empty() {
                routes.by_target.remove(&self.target);
            }
        }
        trace!(handle = %self.target, subscription = self.id, "unsubscribed");
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("target", &self.target)
            .field("id", &self.id)
            .finish()
    }
}
