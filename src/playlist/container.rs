use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, info, warn};

use super::decoder;
use super::tree::{NodeId, PlaylistTree, SharedTree, TreeSnapshot};
use crate::error::Error;
use crate::provider::{ContainerHandle, FlatRecord, ObjectEvent, RemoteHandle, RemoteRef};
use crate::session::Context;

/// The user's playlist container, decoded into a folder tree.
///
/// The tree is rebuilt from scratch whenever the provider reports that the
/// container loaded or its membership changed. A malformed record sequence
/// leaves the tree empty and is reported through [`Self::decode_error`].
pub struct PlaylistContainer {
    ctx: Context,
    tree: SharedTree,
}

impl PlaylistContainer {
    pub fn new(ctx: &Context) -> Self {
        Self {
            ctx: ctx.clone(),
            tree: Rc::new(RefCell::new(PlaylistTree::new_container(ctx))),
        }
    }

    pub fn bound(ctx: &Context, handle: ContainerHandle) -> Self {
        let mut container = Self::new(ctx);
        container.load(handle);
        container
    }

    /// Binds to `handle`. Returns `false` when it was already bound to it,
    /// or when the session has shut down.
    pub fn load(&mut self, handle: ContainerHandle) -> bool {
        if self.handle() == Some(handle) || !self.ctx.provider().is_connected() {
            return false;
        }
        self.unload();

        let binding = RemoteRef::acquire(self.ctx.provider(), handle);
        let subscription = self
            .ctx
            .dispatcher()
            .subscribe(handle.id(), container_handler(Rc::downgrade(&self.tree), handle));
        self.tree.borrow_mut().bind_container(binding, subscription);
        debug!(container = %handle.id(), "container bound");

        let loaded = self
            .ctx
            .provider()
            .with(|p| p.is_loaded(handle.id()))
            .unwrap_or(false);
        if loaded {
            self.tree.borrow_mut().set_container_loading(false);
            // Failures are kept on the tree for decode_error().
            let _ = rebuild(&self.tree, handle);
        }
        true
    }

    pub fn unload(&mut self) {
        self.tree.borrow_mut().unbind_root();
    }

    pub fn handle(&self) -> Option<ContainerHandle> {
        self.tree.borrow().container_handle()
    }

    pub fn is_loading(&self, recursive: bool) -> bool {
        self.tree.borrow().is_loading(NodeId::ROOT, recursive)
    }

    pub fn decode_error(&self) -> Option<Error> {
        self.tree.borrow().decode_error().cloned()
    }

    /// Borrow of the decoded tree. Do not hold it across a pump.
    pub fn tree(&self) -> Ref<'_, PlaylistTree> {
        self.tree.borrow()
    }

    pub fn flatten(&self) -> Vec<FlatRecord> {
        self.tree.borrow().flatten()
    }

    pub fn snapshot(&self) -> Option<TreeSnapshot> {
        self.tree.borrow().snapshot(NodeId::ROOT)
    }

    pub fn dump(&self) -> String {
        self.tree.borrow().dump()
    }
}

impl fmt::Debug for PlaylistContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaylistContainer")
            .field("handle", &self.handle())
            .field("tree", &*self.tree.borrow())
            .finish()
    }
}

fn container_handler(
    tree: Weak<RefCell<PlaylistTree>>,
    handle: ContainerHandle,
) -> impl FnMut(&ObjectEvent) -> Result<(), Error> {
    move |event| {
        let tree = tree
            .upgrade()
            .ok_or(Error::StaleHandle { handle: handle.id() })?;
        if tree.borrow().container_handle() != Some(handle) {
            return Err(Error::StaleHandle { handle: handle.id() });
        }
        match event {
            ObjectEvent::ContainerLoaded => {
                tree.borrow_mut().set_container_loading(false);
                rebuild(&tree, handle)
            }
            event if event.reshapes_container() => {
                if tree.borrow().root_loading() {
                    return Ok(());
                }
                rebuild(&tree, handle)
            }
            _ => Ok(()),
        }
    }
}

/// Throws the old tree away and decodes the container's current records.
fn rebuild(shared: &SharedTree, handle: ContainerHandle) -> Result<(), Error> {
    let weak = Rc::downgrade(shared);
    let mut tree = shared.borrow_mut();
    let records: Vec<FlatRecord> = tree
        .context()
        .provider()
        .with(|p| {
            (0..p.container_num_records(handle))
                .map(|i| p.container_record(handle, i))
                .collect()
        })
        .unwrap_or_default();

    tree.reset();
    match decoder::decode(&mut tree, &records) {
        Ok(playlists) => {
            tree.set_decode_error(None);
            for node in &playlists {
                tree.activate_playlist(&weak, *node);
            }
            info!(
                container = %handle.id(),
                records = records.len(),
                playlists = playlists.len(),
                "container decoded"
            );
            Ok(())
        }
        Err(err) => {
            tree.reset();
            let err = Error::from(err);
            warn!(container = %handle.id(), error = %err, "container left empty");
            tree.set_decode_error(Some(err.clone()));
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::{HierarchyError, NodeKind};
    use crate::provider::{CatalogProbe, FlatRecord};
    use crate::testing::{sample_fixture, simulated_context};

    fn loaded_container() -> (Context, CatalogProbe, PlaylistContainer) {
        let (ctx, probe) = simulated_context(sample_fixture());
        let handle = probe.container().unwrap();
        let container = PlaylistContainer::bound(&ctx, handle);
        probe.set_loaded(handle.id());
        ctx.dispatcher().dispatch(handle.id(), &ObjectEvent::ContainerLoaded);
        (ctx, probe, container)
    }

    #[test]
    fn loading_until_container_callback() {
        let (ctx, probe) = simulated_context(sample_fixture());
        let container = PlaylistContainer::bound(&ctx, probe.container().unwrap());
        assert!(container.is_loading(false));
        assert!(container.tree().is_empty());
    }

    #[test]
    fn decodes_fixture_hierarchy() {
        let (_ctx, _probe, container) = loaded_container();
        assert!(!container.is_loading(false));
        assert!(container.decode_error().is_none());

        let tree = container.tree();
        let root = tree.root();
        assert_eq!(tree.num_children(root), 2);
        let folder = tree.child(root, 1).unwrap();
        assert_eq!(tree.kind(folder), Some(NodeKind::Folder));
        assert_eq!(tree.name(folder).as_deref(), Some("Chill"));
        assert_eq!(tree.folder_group_id(folder), Some(42));
        let playlist = tree.child(folder, 0).unwrap();
        assert_eq!(tree.name(playlist).as_deref(), Some("Evening"));
    }

    #[test]
    fn still_loading_while_any_playlist_is() {
        let (ctx, probe, container) = loaded_container();
        assert!(container.is_loading(true));

        let pending: Vec<_> = {
            let tree = container.tree();
            let root = tree.root();
            let folder = tree.child(root, 1).unwrap();
            [tree.child(root, 0), tree.child(folder, 0)]
                .into_iter()
                .flatten()
                .filter_map(|n| tree.playlist_handle(n))
                .collect()
        };
        for playlist in pending {
            probe.set_loaded(playlist.id());
            ctx.dispatcher()
                .dispatch(playlist.id(), &ObjectEvent::PlaylistStateChanged);
        }
        probe.load_all_tracks();
        assert!(!container.is_loading(true));
        assert!(container.dump().contains("Track [Midnight City]"));
    }

    #[test]
    fn unbalanced_records_leave_tree_empty() {
        let (ctx, probe) = simulated_context(sample_fixture());
        let handle = probe.container().unwrap();
        probe.set_container_records(vec![FlatRecord::FolderEnd]);
        probe.set_loaded(handle.id());

        let container = PlaylistContainer::bound(&ctx, handle);
        assert!(container.tree().is_empty());
        assert_eq!(
            container.decode_error(),
            Some(Error::MalformedHierarchy(HierarchyError::UnmatchedFolderEnd { record: 0 }))
        );
    }

    #[test]
    fn stray_folder_end_after_nodes_leaves_nothing_reachable() {
        let (ctx, probe) = simulated_context(sample_fixture());
        let handle = probe.container().unwrap();
        let (p1, p2) = (probe.playlist("p1").unwrap(), probe.playlist("p2").unwrap());
        probe.set_container_records(vec![
            FlatRecord::Entry(p1),
            FlatRecord::FolderStart,
            FlatRecord::Entry(p2),
            FlatRecord::FolderEnd,
            FlatRecord::FolderEnd,
        ]);

        let container = PlaylistContainer::bound(&ctx, handle);
        probe.set_loaded(handle.id());
        let result = ctx
            .dispatcher()
            .dispatch(handle.id(), &ObjectEvent::ContainerLoaded);
        assert_eq!(result.failures.len(), 1);

        assert!(container.tree().is_empty());
        assert_eq!(container.tree().len(), 1);
        assert!(container.flatten().is_empty());
        assert_eq!(
            container.decode_error(),
            Some(Error::MalformedHierarchy(HierarchyError::UnmatchedFolderEnd { record: 4 }))
        );
        assert_eq!(probe.ref_count(p1.id()), 0);
        assert_eq!(probe.ref_count(p2.id()), 0);
    }

    #[test]
    fn membership_change_rebuilds_and_invalidates_old_nodes() {
        let (ctx, probe, container) = loaded_container();
        let old = {
            let tree = container.tree();
            let first = tree.child(NodeId::ROOT, 0).unwrap();
            tree.playlist_handle(first).unwrap()
        };

        let mut records = container.flatten();
        records.remove(0);
        probe.set_container_records(records);
        let handle = container.handle().unwrap();
        ctx.dispatcher()
            .dispatch(handle.id(), &ObjectEvent::PlaylistRemoved { position: 0 });

        assert_eq!(container.tree().num_children(NodeId::ROOT), 1);
        assert_eq!(probe.ref_count(old.id()), 0);

        let delivery = ctx
            .dispatcher()
            .dispatch(old.id(), &ObjectEvent::PlaylistStateChanged);
        assert_eq!(delivery.invoked, 0);
    }

    #[test]
    fn unload_releases_everything() {
        let (_ctx, probe, mut container) = loaded_container();
        let handle = container.handle().unwrap();
        assert_eq!(probe.ref_count(handle.id()), 1);

        container.unload();
        assert_eq!(probe.ref_count(handle.id()), 0);
        assert!(!container.is_loading(true));
        assert!(container.tree().is_empty());
    }
}
