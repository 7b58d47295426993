// Remote-backed entities - tracks, albums, artists, images, browse results
// All of them share one load state machine: Unbound -> Loading -> Loaded

mod album;
mod artist;
mod image;
mod track;

pub use album::{Album, AlbumBrowse, Disc};
pub use artist::{Artist, ArtistBrowse};
pub use image::Image;
pub use track::Track;

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::Serialize;

use crate::error::Error;
use crate::provider::{ObjectEvent, Provider, RemoteHandle, RemoteRef};
use crate::session::{Context, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadState {
    Unbound,
    Loading,
    Loaded,
}

type Continuation = Box<dyn FnOnce()>;

struct Slot<H: RemoteHandle> {
    binding: Option<RemoteRef<H>>,
    completed: bool,
    subscription: Option<Subscription>,
}

impl<H: RemoteHandle> Slot<H> {
    fn handle(&self) -> Option<H> {
        self.binding.as_ref().map(RemoteRef::handle)
    }
}

/// A remote handle plus its load state.
///
/// Binding takes exactly one provider reference; rebinding releases the old
/// one first and binding the handle already held does nothing. A completion
/// callback that arrives after the entity moved on is reported as
/// [`Error::StaleHandle`] and otherwise ignored.
pub struct Loadable<H: RemoteHandle> {
    ctx: Context,
    slot: Rc<RefCell<Slot<H>>>,
}

impl<H: RemoteHandle> Loadable<H> {
    pub fn new(ctx: &Context) -> Self {
        Self {
            ctx: ctx.clone(),
            slot: Rc::new(RefCell::new(Slot {
                binding: None,
                completed: false,
                subscription: None,
            })),
        }
    }

    pub fn bound(ctx: &Context, handle: H) -> Self {
        let mut entity = Self::new(ctx);
        entity.load(handle);
        entity
    }

    /// Binds to `handle`. Returns `false` when it was already bound to it,
    /// or when the session has shut down.
    pub fn load(&mut self, handle: H) -> bool {
        if self.handle() == Some(handle) || !self.ctx.provider().is_connected() {
            return false;
        }
        self.unload();
        let binding = RemoteRef::acquire(self.ctx.provider(), handle);
        self.bind(binding, None);
        true
    }

    /// Binds a handle whose reference the provider already handed to us.
    pub(crate) fn adopt(&mut self, handle: H, on_loaded: Option<Continuation>) {
        let binding = RemoteRef::adopt(self.ctx.provider(), handle);
        if self.handle() == Some(handle) {
            // `binding` drops here and gives back the extra reference.
            return;
        }
        self.bind(binding, on_loaded);
    }

    fn bind(&mut self, binding: RemoteRef<H>, on_loaded: Option<Continuation>) {
        self.unload();
        let handle = binding.handle();
        let subscription = self.ctx.dispatcher().subscribe(
            handle.id(),
            completion_handler(Rc::downgrade(&self.slot), handle, on_loaded),
        );

        let mut slot = self.slot.borrow_mut();
        slot.binding = Some(binding);
        slot.completed = false;
        slot.subscription = Some(subscription);
    }

    pub fn unload(&mut self) {
        let (binding, subscription) = {
            let mut slot = self.slot.borrow_mut();
            slot.completed = false;
            (slot.binding.take(), slot.subscription.take())
        };
        drop(subscription);
        drop(binding);
    }

    pub fn handle(&self) -> Option<H> {
        self.slot.borrow().handle()
    }

    /// Once the session has shut down every entity reports `Unbound`.
    pub fn state(&self) -> LoadState {
        if !self.ctx.provider().is_connected() {
            return LoadState::Unbound;
        }
        let (handle, completed) = {
            let slot = self.slot.borrow();
            (slot.handle(), slot.completed)
        };
        match handle {
            None => LoadState::Unbound,
            Some(_) if completed => LoadState::Loaded,
            Some(h) => {
                let loaded = self
                    .ctx
                    .provider()
                    .with(|p| p.is_loaded(h.id()))
                    .unwrap_or(false);
                if loaded {
                    LoadState::Loaded
                } else {
                    LoadState::Loading
                }
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        self.state() == LoadState::Loading
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Asks the provider about the bound handle. `None` when unbound or
    /// disconnected.
    pub(crate) fn query<R>(&self, f: impl FnOnce(&dyn Provider, H) -> Option<R>) -> Option<R> {
        let handle = self.handle()?;
        self.ctx.provider().with(|p| f(p, handle)).flatten()
    }

    pub(crate) fn query_list<R>(&self, f: impl FnOnce(&dyn Provider, H) -> Vec<R>) -> Vec<R> {
        self.query(|p, h| Some(f(p, h))).unwrap_or_default()
    }
}

impl<H: RemoteHandle> fmt::Debug for Loadable<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loadable")
            .field("handle", &self.handle())
            .finish()
    }
}

fn completion_handler<H: RemoteHandle>(
    slot: Weak<RefCell<Slot<H>>>,
    handle: H,
    mut on_loaded: Option<Continuation>,
) -> impl FnMut(&ObjectEvent) -> Result<(), Error> {
    move |event| {
        let stale = || Error::StaleHandle { handle: handle.id() };
        let slot = slot.upgrade().ok_or_else(stale)?;
        {
            let mut slot = slot.borrow_mut();
            if slot.handle() != Some(handle) {
                return Err(stale());
            }
            if *event != ObjectEvent::Loaded {
                return Ok(());
            }
            slot.completed = true;
        }
        if let Some(continuation) = on_loaded.take() {
            continuation();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderEvent, TrackHandle};
    use crate::testing::{sample_fixture, simulated_context};

    fn track(probe: &crate::provider::CatalogProbe, id: &str) -> TrackHandle {
        probe.track(id).expect("fixture track")
    }

    #[test]
    fn unbound_entity_is_not_loading() {
        let (ctx, _probe) = simulated_context(sample_fixture());
        let entity: Loadable<TrackHandle> = Loadable::new(&ctx);
        assert_eq!(entity.state(), LoadState::Unbound);
        assert!(!entity.is_loading());
        assert!(entity.query(|p, h| p.track_name(h)).is_none());
    }

    #[test]
    fn load_same_handle_twice_takes_one_reference() {
        let (ctx, probe) = simulated_context(sample_fixture());
        let t1 = track(&probe, "t1");

        let mut entity = Loadable::new(&ctx);
        assert!(entity.load(t1));
        assert!(!entity.load(t1));
        assert_eq!(probe.ref_count(t1.id()), 1);

        entity.unload();
        assert_eq!(probe.ref_count(t1.id()), 0);
        assert_eq!(entity.state(), LoadState::Unbound);
    }

    #[test]
    fn rebinding_releases_previous_handle_first() {
        let (ctx, probe) = simulated_context(sample_fixture());
        let (t1, t2) = (track(&probe, "t1"), track(&probe, "t2"));

        let mut entity = Loadable::new(&ctx);
        entity.load(t1);
        entity.load(t2);
        assert_eq!(probe.ref_count(t1.id()), 0);
        assert_eq!(probe.ref_count(t2.id()), 1);

        drop(entity);
        assert_eq!(probe.ref_count(t2.id()), 0);
    }

    #[test]
    fn loaded_callback_completes_entity() {
        let (ctx, probe) = simulated_context(sample_fixture());
        let t1 = track(&probe, "t1");

        let entity = Loadable::bound(&ctx, t1);
        assert_eq!(entity.state(), LoadState::Loading);

        let delivery = ctx
            .dispatcher()
            .dispatch(t1.id(), &ObjectEvent::Loaded);
        assert_eq!(delivery.invoked, 1);
        assert!(delivery.failures.is_empty());
        assert_eq!(entity.state(), LoadState::Loaded);
    }

    #[test]
    fn completion_after_unload_is_ignored() {
        let (ctx, probe) = simulated_context(sample_fixture());
        let t1 = track(&probe, "t1");

        let mut entity = Loadable::bound(&ctx, t1);
        entity.unload();

        probe.push_event(ProviderEvent::object(t1, ObjectEvent::Loaded));
        let delivery = ctx.dispatcher().dispatch(t1.id(), &ObjectEvent::Loaded);
        assert_eq!(delivery.invoked, 0);
        assert_eq!(entity.state(), LoadState::Unbound);
    }

    #[test]
    fn in_flight_completion_for_old_handle_is_stale() {
        let (ctx, probe) = simulated_context(sample_fixture());
        let (t1, t2) = (track(&probe, "t1"), track(&probe, "t2"));

        let entity = Rc::new(RefCell::new(Loadable::bound(&ctx, t1)));

        // An earlier subscriber on the same handle rebinds the entity before
        // the entity's own handler for t1 gets to run.
        let rebinder = Rc::clone(&entity);
        let first = ctx.dispatcher().subscribe(t1.id(), move |_| {
            rebinder.borrow_mut().load(t2);
            Ok(())
        });
        // Put the rebinder in front by re-subscribing the entity after it.
        entity.borrow_mut().unload();
        entity.borrow_mut().load(t1);

        let delivery = ctx.dispatcher().dispatch(t1.id(), &ObjectEvent::Loaded);
        assert_eq!(delivery.invoked, 2);
        assert_eq!(delivery.failures.len(), 1);
        assert!(delivery.failures[0].is_benign());
        assert_eq!(entity.borrow().handle(), Some(t2));
        assert_eq!(entity.borrow().state(), LoadState::Loading);
        drop(first);
    }

    #[test]
    fn continuation_runs_once_on_completion() {
        let (ctx, probe) = simulated_context(sample_fixture());
        let t1 = track(&probe, "t1");
        let runs = Rc::new(std::cell::Cell::new(0));

        let mut entity = Loadable::new(&ctx);
        let counter = Rc::clone(&runs);
        ctx.provider().with_mut(|p| p.add_ref(t1.id()));
        entity.adopt(t1, Some(Box::new(move || counter.set(counter.get() + 1))));

        ctx.dispatcher().dispatch(t1.id(), &ObjectEvent::Loaded);
        ctx.dispatcher().dispatch(t1.id(), &ObjectEvent::Loaded);
        assert_eq!(runs.get(), 1);
        assert_eq!(probe.ref_count(t1.id()), 1);
    }
}
