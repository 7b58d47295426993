// bangcatalog - client façade over a remote music catalog session
// Reference-counted handles, a single-threaded event pump, playlist trees built from flat records

pub mod config;    // settings and preferences
pub mod entity;    // tracks, albums, artists, images, browse results
pub mod error;     // error taxonomy shared by every module
pub mod logging;   // rolling file + optional stderr
pub mod playlist;  // container folder tree and standalone playlists
pub mod provider;  // the remote catalog contract, plus the simulated catalog
pub mod session;   // connection owner, event pump, driver

#[cfg(test)]
pub(crate) mod testing;

// Export the stuff callers actually use
pub use config::Config;
pub use entity::{Album, AlbumBrowse, Artist, ArtistBrowse, Disc, Image, LoadState, Track};
pub use error::{Error, Result};
pub use playlist::{HierarchyError, NodeId, NodeKind, Playlist, PlaylistContainer, PlaylistTree};
pub use provider::{Provider, ProviderError, SimulatedProvider};
pub use session::{drive_until, PumpSignal, Pumped, Session, SessionConfig, SessionEvent};
