use std::cell::RefCell;
use std::fmt::{self, Write as _};
use std::rc::{Rc, Weak};

use serde::Serialize;
use tracing::{debug, trace};

use crate::entity::Track;
use crate::error::Error;
use crate::provider::{
    ContainerHandle, FlatRecord, ObjectEvent, PlaylistHandle, RemoteHandle, RemoteRef,
};
use crate::session::{Context, Subscription};

/// Index of a node in its tree's arena. Parent links are stored as these,
/// so a child never keeps its parent alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeKind {
    Container,
    Folder,
    Playlist,
    Track,
}

pub(crate) struct PlaylistNode {
    handle: Option<PlaylistHandle>,
    binding: Option<RemoteRef<PlaylistHandle>>,
    loading: bool,
    subscription: Option<Subscription>,
}

impl PlaylistNode {
    pub(crate) fn pending(handle: Option<PlaylistHandle>) -> Self {
        Self {
            handle,
            binding: None,
            loading: false,
            subscription: None,
        }
    }

    fn bound_handle(&self) -> Option<PlaylistHandle> {
        self.binding.as_ref().map(RemoteRef::handle)
    }
}

pub(crate) struct ContainerRoot {
    binding: Option<RemoteRef<ContainerHandle>>,
    loading: bool,
    subscription: Option<Subscription>,
}

pub(crate) enum Body {
    Container(ContainerRoot),
    /// Index of the folder's start record in the container's flat sequence.
    Folder { record: usize },
    Playlist(PlaylistNode),
    Track(Track),
}

impl Body {
    fn kind(&self) -> NodeKind {
        match self {
            Body::Container(_) => NodeKind::Container,
            Body::Folder { .. } => NodeKind::Folder,
            Body::Playlist(_) => NodeKind::Playlist,
            Body::Track(_) => NodeKind::Track,
        }
    }
}

struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    body: Body,
}

/// Serializable view of a subtree, taken at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeSnapshot {
    pub kind: NodeKind,
    pub name: Option<String>,
    pub loading: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeSnapshot>,
}

/// Arena holding one playlist hierarchy.
///
/// The root is either a container (folders and playlists below it) or a
/// single playlist (tracks below it). Only the decoder and the load
/// callbacks add nodes; a parent link is set once, at attach time.
pub struct PlaylistTree {
    ctx: Context,
    nodes: Vec<Option<Node>>,
    /// Vacated slots below the root, reused by `attach`.
    free: Vec<usize>,
    generation: u64,
    decode_error: Option<Error>,
}

impl PlaylistTree {
    fn with_root(ctx: &Context, body: Body) -> Self {
        Self {
            ctx: ctx.clone(),
            nodes: vec![Some(Node {
                parent: None,
                children: Vec::new(),
                body,
            })],
            free: Vec::new(),
            generation: 0,
            decode_error: None,
        }
    }

    pub(crate) fn new_container(ctx: &Context) -> Self {
        Self::with_root(
            ctx,
            Body::Container(ContainerRoot {
                binding: None,
                loading: false,
                subscription: None,
            }),
        )
    }

    pub(crate) fn new_playlist(ctx: &Context) -> Self {
        Self::with_root(ctx, Body::Playlist(PlaylistNode::pending(None)))
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.node(id).map(|n| n.body.kind())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map_or(&[], |n| n.children.as_slice())
    }

    pub fn has_children(&self, id: NodeId) -> bool {
        !self.children(id).is_empty()
    }

    pub fn num_children(&self, id: NodeId) -> usize {
        self.children(id).len()
    }

    pub fn child(&self, id: NodeId, position: usize) -> Option<NodeId> {
        self.children(id).get(position).copied()
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_children(NodeId::ROOT)
    }

    /// Error from the last decode pass, cleared by the next successful one.
    pub fn decode_error(&self) -> Option<&Error> {
        self.decode_error.as_ref()
    }

    pub fn container_handle(&self) -> Option<ContainerHandle> {
        match &self.node(NodeId::ROOT)?.body {
            Body::Container(root) => root.binding.as_ref().map(RemoteRef::handle),
            _ => None,
        }
    }

    pub fn playlist_handle(&self, id: NodeId) -> Option<PlaylistHandle> {
        match &self.node(id)?.body {
            Body::Playlist(p) => p.handle,
            _ => None,
        }
    }

    /// A new track entity, holding its own reference, for a track node.
    pub fn track(&self, id: NodeId) -> Option<Track> {
        match &self.node(id)?.body {
            Body::Track(track) => Some(track.clone()),
            _ => None,
        }
    }

    pub fn name(&self, id: NodeId) -> Option<String> {
        match &self.node(id)?.body {
            Body::Container(_) => Some("Container".to_string()),
            Body::Folder { record } => {
                let container = self.container_handle()?;
                self.ctx
                    .provider()
                    .with(|p| p.container_folder_name(container, *record))
                    .flatten()
            }
            Body::Playlist(p) => {
                let handle = p.bound_handle()?;
                self.ctx.provider().with(|pr| pr.playlist_name(handle)).flatten()
            }
            Body::Track(track) => track.name(),
        }
    }

    /// Group id of a folder node, valid only while the container is bound.
    pub fn folder_group_id(&self, id: NodeId) -> Option<u64> {
        match &self.node(id)?.body {
            Body::Folder { record } => {
                let container = self.container_handle()?;
                self.ctx
                    .provider()
                    .with(|p| p.container_folder_id(container, *record))
                    .flatten()
            }
            _ => None,
        }
    }

    /// Whether `id` (and with `recursive`, anything below it) is still
    /// waiting on the provider. Evaluated fresh on every call; nothing is
    /// loading once the session has shut down.
    pub fn is_loading(&self, id: NodeId, recursive: bool) -> bool {
        if !self.ctx.provider().is_connected() {
            return false;
        }
        self.node_loading(id, recursive)
    }

    fn node_loading(&self, id: NodeId, recursive: bool) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        let own = match &node.body {
            Body::Container(root) => root.binding.is_some() && root.loading,
            Body::Folder { .. } => false,
            Body::Playlist(p) => p.binding.is_some() && p.loading,
            Body::Track(track) => track.is_loading(),
        };
        own || (recursive && node.children.iter().any(|c| self.node_loading(*c, true)))
    }

    /// Pre-order walk re-emitting the flat records the tree was decoded
    /// from. Placeholders are gone; tracks are not records.
    pub fn flatten(&self) -> Vec<FlatRecord> {
        let mut records = Vec::new();
        self.flatten_into(NodeId::ROOT, &mut records);
        records
    }

    fn flatten_into(&self, id: NodeId, out: &mut Vec<FlatRecord>) {
        for &child in self.children(id) {
            match self.node(child).map(|n| &n.body) {
                Some(Body::Playlist(p)) => {
                    if let Some(handle) = p.handle {
                        out.push(FlatRecord::Entry(handle));
                    }
                }
                Some(Body::Folder { .. }) => {
                    out.push(FlatRecord::FolderStart);
                    self.flatten_into(child, out);
                    out.push(FlatRecord::FolderEnd);
                }
                _ => {}
            }
        }
    }

    pub fn snapshot(&self, id: NodeId) -> Option<TreeSnapshot> {
        let node = self.node(id)?;
        Some(TreeSnapshot {
            kind: node.body.kind(),
            name: self.name(id),
            loading: self.is_loading(id, false),
            children: node
                .children
                .iter()
                .filter_map(|c| self.snapshot(*c))
                .collect(),
        })
    }

    /// Indented text rendering of the whole tree.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_into(NodeId::ROOT, 0, &mut out);
        out
    }

    fn dump_into(&self, id: NodeId, level: usize, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        let line = match &node.body {
            Body::Container(_) => "Container".to_string(),
            Body::Folder { .. } => format!("Folder [{}]", self.name(id).unwrap_or_default()),
            Body::Playlist(_) => format!("PlayList [{}]", self.name(id).unwrap_or_default()),
            Body::Track(track) => track.describe(),
        };
        let _ = writeln!(out, "{:indent$}{}", "", line, indent = level * 2);
        for &child in &node.children {
            self.dump_into(child, level + 1, out);
        }
    }

    pub(crate) fn context(&self) -> &Context {
        &self.ctx
    }

    pub(crate) fn set_decode_error(&mut self, error: Option<Error>) {
        self.decode_error = error;
    }

    /// Appends `body` as the last child of `parent`.
    pub(crate) fn attach(&mut self, parent: NodeId, body: Body) -> NodeId {
        let node = Node {
            parent: Some(parent),
            children: Vec::new(),
            body,
        };
        let id = match self.free.pop() {
            Some(index) => {
                self.nodes[index] = Some(node);
                NodeId(index)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        };
        if let Some(parent) = self.node_mut(parent) {
            parent.children.push(id);
        }
        id
    }

    /// Drops every descendant of `id`, releasing whatever they held.
    pub(crate) fn remove_children(&mut self, id: NodeId) {
        if id == NodeId::ROOT {
            self.nodes.truncate(1);
            self.free.clear();
        }
        let children = match self.node_mut(id) {
            Some(node) => std::mem::take(&mut node.children),
            None => return,
        };
        for child in children {
            self.remove_children(child);
            if let Some(slot) = self.nodes.get_mut(child.0) {
                if slot.take().is_some() {
                    self.free.push(child.0);
                }
            }
        }
    }

    /// Empties the tree below the root and invalidates every callback
    /// registered against the old nodes.
    pub(crate) fn reset(&mut self) {
        self.remove_children(NodeId::ROOT);
        self.generation += 1;
    }

    pub(crate) fn bind_container(
        &mut self,
        binding: RemoteRef<ContainerHandle>,
        subscription: Subscription,
    ) {
        self.reset();
        if let Some(Body::Container(root)) = self.node_mut(NodeId::ROOT).map(|n| &mut n.body) {
            root.binding = Some(binding);
            root.subscription = Some(subscription);
            root.loading = true;
        }
    }

    pub(crate) fn unbind_root(&mut self) {
        self.reset();
        self.decode_error = None;
        match self.node_mut(NodeId::ROOT).map(|n| &mut n.body) {
            Some(Body::Container(root)) => {
                root.subscription = None;
                root.binding = None;
                root.loading = false;
            }
            Some(Body::Playlist(p)) => {
                p.subscription = None;
                p.binding = None;
                p.handle = None;
                p.loading = false;
            }
            _ => {}
        }
    }

    pub(crate) fn root_loading(&self) -> bool {
        match self.node(NodeId::ROOT).map(|n| &n.body) {
            Some(Body::Container(root)) => root.loading,
            Some(Body::Playlist(p)) => p.loading,
            _ => false,
        }
    }

    pub(crate) fn set_container_loading(&mut self, loading: bool) {
        if let Some(Body::Container(root)) = self.node_mut(NodeId::ROOT).map(|n| &mut n.body) {
            root.loading = loading;
        }
    }

    pub(crate) fn set_root_playlist(&mut self, handle: PlaylistHandle) {
        if let Some(Body::Playlist(p)) = self.node_mut(NodeId::ROOT).map(|n| &mut n.body) {
            p.handle = Some(handle);
        }
    }

    /// Binds the playlist at `id` to its handle and starts listening for its
    /// track list. If the provider already has the list, tracks attach now.
    pub(crate) fn activate_playlist(&mut self, tree: &Weak<RefCell<PlaylistTree>>, id: NodeId) {
        let Some(handle) = self.playlist_handle(id) else {
            return;
        };
        let binding = RemoteRef::acquire(self.ctx.provider(), handle);
        let subscription = self.ctx.dispatcher().subscribe(
            handle.id(),
            playlist_handler(tree.clone(), id, self.generation, handle),
        );
        let loaded = self
            .ctx
            .provider()
            .with(|p| p.is_loaded(handle.id()))
            .unwrap_or(false);

        if let Some(Body::Playlist(p)) = self.node_mut(id).map(|n| &mut n.body) {
            p.binding = Some(binding);
            p.subscription = Some(subscription);
            p.loading = !loaded;
        }
        if loaded {
            self.load_tracks(id);
        }
    }

    fn load_tracks(&mut self, id: NodeId) {
        let Some(handle) = self.playlist_handle(id) else {
            return;
        };
        self.remove_children(id);
        let tracks = self
            .ctx
            .provider()
            .with(|p| p.playlist_tracks(handle))
            .unwrap_or_default();
        trace!(playlist = %handle.id(), tracks = tracks.len(), "attaching playlist tracks");
        for track in tracks {
            let track = Track::bound(&self.ctx, track);
            self.attach(id, Body::Track(track));
        }
    }

    fn bound_playlist(&self, id: NodeId) -> Option<PlaylistHandle> {
        match &self.node(id)?.body {
            Body::Playlist(p) => p.bound_handle(),
            _ => None,
        }
    }

    fn on_playlist_event(&mut self, id: NodeId, handle: PlaylistHandle, event: &ObjectEvent) {
        let loading = matches!(
            self.node(id).map(|n| &n.body),
            Some(Body::Playlist(PlaylistNode { loading: true, .. }))
        );
        match event {
            ObjectEvent::PlaylistStateChanged | ObjectEvent::Loaded if loading => {
                let loaded = self
                    .ctx
                    .provider()
                    .with(|p| p.is_loaded(handle.id()))
                    .unwrap_or(false);
                if loaded {
                    if let Some(Body::Playlist(p)) = self.node_mut(id).map(|n| &mut n.body) {
                        p.loading = false;
                    }
                    debug!(playlist = %handle.id(), "playlist loaded");
                    self.load_tracks(id);
                }
            }
            ObjectEvent::TracksChanged if !loading => self.load_tracks(id),
            ObjectEvent::PlaylistRenamed => {
                debug!(playlist = %handle.id(), name = ?self.name(id), "playlist renamed");
            }
            _ => {}
        }
    }
}

impl fmt::Debug for PlaylistTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaylistTree")
            .field("nodes", &self.len())
            .field("generation", &self.generation)
            .field("decode_error", &self.decode_error)
            .finish()
    }
}

fn playlist_handler(
    tree: Weak<RefCell<PlaylistTree>>,
    id: NodeId,
    generation: u64,
    handle: PlaylistHandle,
) -> impl FnMut(&ObjectEvent) -> Result<(), Error> {
    move |event| {
        let stale = || Error::StaleHandle { handle: handle.id() };
        let tree = tree.upgrade().ok_or_else(stale)?;
        let mut tree = tree.borrow_mut();
        if tree.generation != generation || tree.bound_playlist(id) != Some(handle) {
            return Err(stale());
        }
        tree.on_playlist_event(id, handle, event);
        Ok(())
    }
}

/// Shared by container and standalone playlist wrappers.
pub(crate) type SharedTree = Rc<RefCell<PlaylistTree>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::PlaylistContainer;
    use crate::testing::{sample_fixture, simulated_context};

    #[test]
    fn track_churn_reuses_arena_slots() {
        let (ctx, probe) = simulated_context(sample_fixture());
        let p1 = probe.playlist("p1").unwrap();
        probe.set_loaded(p1.id());
        let handle = probe.container().unwrap();
        probe.set_loaded(handle.id());
        let container = PlaylistContainer::bound(&ctx, handle);

        let (node, slots) = {
            let tree = container.tree();
            (tree.child(NodeId::ROOT, 0).unwrap(), tree.nodes.len())
        };
        assert_eq!(container.tree().num_children(node), 2);

        for _ in 0..50 {
            ctx.dispatcher().dispatch(p1.id(), &ObjectEvent::TracksChanged);
        }
        let tree = container.tree();
        assert_eq!(tree.nodes.len(), slots);
        assert_eq!(tree.num_children(node), 2);
        assert_eq!(probe.ref_count(probe.track("t1").unwrap().id()), 1);
    }

    #[test]
    fn removed_children_are_released() {
        let (ctx, probe) = simulated_context(sample_fixture());
        let t1 = probe.track("t1").unwrap();
        let mut tree = PlaylistTree::new_container(&ctx);
        let folder = tree.attach(NodeId::ROOT, Body::Folder { record: 0 });
        tree.attach(folder, Body::Track(Track::bound(&ctx, t1)));
        assert_eq!(probe.ref_count(t1.id()), 1);

        tree.remove_children(folder);
        assert_eq!(probe.ref_count(t1.id()), 0);
        assert_eq!(tree.len(), 2);

        let again = tree.attach(folder, Body::Folder { record: 1 });
        assert_eq!(tree.parent(again), Some(folder));
        assert_eq!(tree.nodes.len(), 3);
    }
}
