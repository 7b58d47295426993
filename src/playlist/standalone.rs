use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use super::tree::{NodeId, PlaylistTree, SharedTree, TreeSnapshot};
use crate::entity::Track;
use crate::provider::PlaylistHandle;
use crate::session::Context;

/// A playlist outside any container, such as the starred list. Tracks are
/// the root's children.
pub struct Playlist {
    tree: SharedTree,
}

impl Playlist {
    pub fn new(ctx: &Context) -> Self {
        Self {
            tree: Rc::new(RefCell::new(PlaylistTree::new_playlist(ctx))),
        }
    }

    pub fn bound(ctx: &Context, handle: PlaylistHandle) -> Self {
        let mut playlist = Self::new(ctx);
        playlist.load(handle);
        playlist
    }

    /// Binds to `handle`. Returns `false` when it was already bound to it,
    /// or when the session has shut down.
    pub fn load(&mut self, handle: PlaylistHandle) -> bool {
        let connected = self.tree.borrow().context().provider().is_connected();
        if self.handle() == Some(handle) || !connected {
            return false;
        }
        self.unload();
        let weak = Rc::downgrade(&self.tree);
        let mut tree = self.tree.borrow_mut();
        tree.set_root_playlist(handle);
        tree.activate_playlist(&weak, NodeId::ROOT);
        true
    }

    pub fn unload(&mut self) {
        self.tree.borrow_mut().unbind_root();
    }

    pub fn handle(&self) -> Option<PlaylistHandle> {
        self.tree.borrow().playlist_handle(NodeId::ROOT)
    }

    pub fn name(&self) -> Option<String> {
        self.tree.borrow().name(NodeId::ROOT)
    }

    pub fn is_loading(&self, recursive: bool) -> bool {
        self.tree.borrow().is_loading(NodeId::ROOT, recursive)
    }

    pub fn num_tracks(&self) -> usize {
        self.tree.borrow().num_children(NodeId::ROOT)
    }

    pub fn track(&self, position: usize) -> Option<Track> {
        let tree = self.tree.borrow();
        tree.child(NodeId::ROOT, position).and_then(|n| tree.track(n))
    }

    pub fn tracks(&self) -> Vec<Track> {
        let tree = self.tree.borrow();
        tree.children(NodeId::ROOT)
            .iter()
            .filter_map(|n| tree.track(*n))
            .collect()
    }

    pub fn tree(&self) -> Ref<'_, PlaylistTree> {
        self.tree.borrow()
    }

    pub fn snapshot(&self) -> Option<TreeSnapshot> {
        self.tree.borrow().snapshot(NodeId::ROOT)
    }

    pub fn dump(&self) -> String {
        self.tree.borrow().dump()
    }
}

impl fmt::Debug for Playlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Playlist")
            .field("handle", &self.handle())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ObjectEvent, RemoteHandle};
    use crate::testing::{sample_fixture, simulated_context};

    #[test]
    fn tracks_attach_once_playlist_loads() {
        let (ctx, probe) = simulated_context(sample_fixture());
        let handle = probe.playlist("p1").unwrap();
        let playlist = Playlist::bound(&ctx, handle);
        assert!(playlist.is_loading(false));
        assert_eq!(playlist.num_tracks(), 0);

        probe.set_loaded(handle.id());
        ctx.dispatcher()
            .dispatch(handle.id(), &ObjectEvent::PlaylistStateChanged);
        assert!(!playlist.is_loading(false));
        assert_eq!(playlist.name().as_deref(), Some("Morning"));
        assert_eq!(playlist.num_tracks(), 2);
        assert!(playlist.is_loading(true));

        probe.load_all_tracks();
        assert!(!playlist.is_loading(true));
        assert_eq!(playlist.track(0).and_then(|t| t.name()).as_deref(), Some("Midnight City"));
    }

    #[test]
    fn track_list_change_rebuilds_children() {
        let (ctx, probe) = simulated_context(sample_fixture());
        let handle = probe.playlist("p1").unwrap();
        probe.set_loaded(handle.id());
        let playlist = Playlist::bound(&ctx, handle);
        assert_eq!(playlist.num_tracks(), 2);

        let t1 = probe.track("t1").unwrap();
        probe.set_playlist_tracks(handle, vec![t1]);
        ctx.dispatcher().dispatch(handle.id(), &ObjectEvent::TracksChanged);
        assert_eq!(playlist.num_tracks(), 1);
        assert_eq!(probe.ref_count(probe.track("t2").unwrap().id()), 0);
    }

    #[test]
    fn rebinding_drops_old_tracks() {
        let (ctx, probe) = simulated_context(sample_fixture());
        let (p1, p2) = (probe.playlist("p1").unwrap(), probe.playlist("p2").unwrap());
        probe.set_loaded(p1.id());
        let mut playlist = Playlist::bound(&ctx, p1);
        let t1 = probe.track("t1").unwrap();
        assert_eq!(probe.ref_count(t1.id()), 1);

        assert!(playlist.load(p2));
        assert!(!playlist.load(p2));
        assert_eq!(probe.ref_count(p1.id()), 0);
        assert_eq!(probe.ref_count(t1.id()), 0);
        assert_eq!(playlist.handle(), Some(p2));
    }
}
