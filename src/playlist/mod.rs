// Playlist hierarchy - container folders, playlists and their tracks
// One arena per tree, rebuilt from the provider's flat records

mod container;
mod decoder;
mod standalone;
mod tree;

pub use container::PlaylistContainer;
pub use decoder::HierarchyError;
pub use standalone::Playlist;
pub use tree::{NodeId, NodeKind, PlaylistTree, TreeSnapshot};
