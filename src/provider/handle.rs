use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use tracing::warn;

use super::Provider;

/// Opaque identifier of a provider-side object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct HandleId(u64);

impl HandleId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle#{}", self.0)
    }
}

/// A typed view of a [`HandleId`]. The type only tells the provider which
/// accessor family applies; reference counting is identical for all of them.
pub trait RemoteHandle: Copy + Eq + fmt::Debug + 'static {
    fn id(&self) -> HandleId;
}

macro_rules! remote_handle {
    ($($(#[$meta:meta])* $name:ident;)+) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub struct $name(HandleId);

            impl $name {
                pub const fn from_id(id: HandleId) -> Self {
                    Self(id)
                }
            }

            impl RemoteHandle for $name {
                fn id(&self) -> HandleId {
                    self.0
                }
            }
        )+
    };
}

remote_handle! {
    TrackHandle;
    AlbumHandle;
    ArtistHandle;
    ImageHandle;
    PlaylistHandle;
    ContainerHandle;
    AlbumBrowseHandle;
    ArtistBrowseHandle;
}

/// Shared, non-owning view of the provider connection.
///
/// The session owns the connection; everything else clones this view. Once
/// the session shuts down the slot is emptied and every call becomes a no-op
/// returning `None`.
#[derive(Clone)]
pub struct ProviderRef {
    inner: Rc<RefCell<Option<Box<dyn Provider>>>>,
}

impl ProviderRef {
    pub(crate) fn new(provider: Box<dyn Provider>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Some(provider))),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.try_borrow().map(|p| p.is_some()).unwrap_or(true)
    }

    pub fn with<R>(&self, f: impl FnOnce(&dyn Provider) -> R) -> Option<R> {
        let guard = self.inner.borrow();
        guard.as_deref().map(f)
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut dyn Provider) -> R) -> Option<R> {
        let mut guard = self.inner.borrow_mut();
        guard.as_deref_mut().map(|p| f(p))
    }

    /// Takes the connection out of the shared slot. Only the session calls this.
    pub(crate) fn disconnect(&self) -> Option<Box<dyn Provider>> {
        self.inner.borrow_mut().take()
    }

    fn release(&self, id: HandleId) {
        match self.inner.try_borrow_mut() {
            Ok(mut guard) => {
                if let Some(provider) = guard.as_deref_mut() {
                    provider.release(id);
                }
            }
            Err(_) => warn!(handle = %id, "provider busy while releasing a handle; reference leaked"),
        }
    }
}

impl fmt::Debug for ProviderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRef")
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// One provider reference on a remote handle, released on drop.
pub struct RemoteRef<H: RemoteHandle> {
    provider: ProviderRef,
    handle: H,
}

impl<H: RemoteHandle> RemoteRef<H> {
    /// Takes a new reference on `handle`.
    pub fn acquire(provider: &ProviderRef, handle: H) -> Self {
        provider.with_mut(|p| p.add_ref(handle.id()));
        Self {
            provider: provider.clone(),
            handle,
        }
    }

    /// Wraps a handle the provider returned with a reference already held
    /// (image and browse creation).
    pub fn adopt(provider: &ProviderRef, handle: H) -> Self {
        Self {
            provider: provider.clone(),
            handle,
        }
    }

    pub fn handle(&self) -> H {
        self.handle
    }

    pub fn provider(&self) -> &ProviderRef {
        &self.provider
    }
}

impl<H: RemoteHandle> Drop for RemoteRef<H> {
    fn drop(&mut self) {
        self.provider.release(self.handle.id());
    }
}

impl<H: RemoteHandle> fmt::Debug for RemoteRef<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RemoteRef").field(&self.handle).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_fixture, simulated_context};

    #[test]
    fn references_follow_remote_ref_lifetime() {
        let (ctx, probe) = simulated_context(sample_fixture());
        let t1 = probe.track("t1").unwrap();

        let first = RemoteRef::acquire(ctx.provider(), t1);
        let second = RemoteRef::acquire(ctx.provider(), t1);
        assert_eq!(probe.ref_count(t1.id()), 2);
        drop(first);
        assert_eq!(probe.ref_count(t1.id()), 1);
        drop(second);
        assert_eq!(probe.ref_count(t1.id()), 0);
    }

    #[test]
    fn disconnected_slot_turns_calls_into_none() {
        let (ctx, probe) = simulated_context(sample_fixture());
        let t1 = probe.track("t1").unwrap();
        let provider = ctx.provider();
        assert_eq!(provider.with_mut(|p| p.track_name(t1)), Some(Some("Midnight City".into())));

        let held = RemoteRef::acquire(provider, t1);
        drop(provider.disconnect());
        assert!(!provider.is_connected());
        assert_eq!(provider.with_mut(|p| p.add_ref(t1.id())), None);
        assert_eq!(provider.with(|p| p.is_loaded(t1.id())), None);
        drop(held);
        assert_eq!(probe.ref_count(t1.id()), 1);
    }
}
