// Provider contract - everything the remote catalog service exposes to us
// Connection, auth, audio and disk caching live behind this trait

mod handle;
pub mod simulated;

pub use handle::{
    AlbumBrowseHandle, AlbumHandle, ArtistBrowseHandle, ArtistHandle, ContainerHandle, HandleId,
    ImageHandle, PlaylistHandle, ProviderRef, RemoteHandle, RemoteRef, TrackHandle,
};
pub use simulated::{CatalogFixture, CatalogProbe, SimulatedProvider};

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failures reported by the provider itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("application key is missing or invalid")]
    InvalidApplicationKey,
    #[error("unusable path: {path}")]
    BadPath { path: String },
    #[error("username or password rejected")]
    BadCredentials,
    #[error("track is not playable")]
    TrackNotPlayable,
    #[error("network error: {message}")]
    Network { message: String },
    #[error("{message}")]
    Other { message: String },
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    LoggedOut,
    LoggedIn,
    Disconnected,
    Undefined,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bitrate {
    Kbps96,
    Kbps160,
    Kbps320,
}

/// Provider-side identifier of an image (album cover, artist portrait).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageId(pub String);

impl From<&str> for ImageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One record of a container's flattened folder hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlatRecord {
    Entry(PlaylistHandle),
    FolderStart,
    FolderEnd,
    Placeholder,
}

/// Callbacks that concern the session as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCallback {
    LoggedIn(ProviderResult<()>),
    LoggedOut,
    MetadataUpdated,
    ConnectionError(ProviderError),
    MessageToUser(String),
    PlayTokenLost,
    LogMessage(String),
    EndOfTrack,
    StreamingError(ProviderError),
    UserInfoUpdated,
    StartPlayback,
    StopPlayback,
}

/// Callbacks routed to whoever subscribed to a specific handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectEvent {
    /// Metadata, image or browse result finished loading.
    Loaded,
    ContainerLoaded,
    PlaylistAdded { position: usize },
    PlaylistRemoved { position: usize },
    PlaylistMoved { from: usize, to: usize },
    PlaylistStateChanged,
    TracksChanged,
    PlaylistRenamed,
}

impl ObjectEvent {
    /// Container membership changed after the initial load.
    pub fn reshapes_container(&self) -> bool {
        matches!(
            self,
            ObjectEvent::PlaylistAdded { .. }
                | ObjectEvent::PlaylistRemoved { .. }
                | ObjectEvent::PlaylistMoved { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    Session(SessionCallback),
    Object { target: HandleId, event: ObjectEvent },
}

impl ProviderEvent {
    pub fn object(target: impl RemoteHandle, event: ObjectEvent) -> Self {
        ProviderEvent::Object {
            target: target.id(),
            event,
        }
    }
}

/// Callbacks drained by one `process_events` call, in provider order.
#[derive(Debug, Clone, Default)]
pub struct EventBatch {
    pub events: Vec<ProviderEvent>,
    pub next_timeout: Duration,
}

/// The remote catalog session.
///
/// Every method is called from the pump thread. The only thing a provider may
/// do from its own threads is call [`crate::session::PumpSignal::request`].
/// Accessors for individual fields default to "no data" so that providers
/// only implement what they actually serve.
pub trait Provider {
    fn process_events(&mut self) -> EventBatch;

    fn login(&mut self, username: &str, password: &str, remember_me: bool);
    fn logout(&mut self);
    fn connection_state(&self) -> ConnectionState;

    fn add_ref(&mut self, handle: HandleId);
    fn release(&mut self, handle: HandleId);
    fn is_loaded(&self, handle: HandleId) -> bool;

    fn player_load(&mut self, track: TrackHandle) -> ProviderResult<()>;
    fn player_unload(&mut self);
    fn player_play(&mut self, _play: bool) {}
    fn player_seek(&mut self, _offset_ms: u32) {}
    fn player_prefetch(&mut self, _track: TrackHandle) -> ProviderResult<()> {
        Ok(())
    }
    fn set_preferred_bitrate(&mut self, _bitrate: Bitrate) {}

    /// The logged-in user's root container. Owned by the session; callers
    /// still take their own reference.
    fn session_container(&mut self) -> Option<ContainerHandle>;
    /// The user's starred tracks as a playlist. Callers take their own reference.
    fn starred_playlist(&mut self) -> Option<PlaylistHandle> {
        None
    }

    fn container_num_records(&self, container: ContainerHandle) -> usize;
    fn container_record(&self, container: ContainerHandle, index: usize) -> FlatRecord;
    fn container_folder_name(&self, _container: ContainerHandle, _index: usize) -> Option<String> {
        None
    }
    fn container_folder_id(&self, _container: ContainerHandle, _index: usize) -> Option<u64> {
        None
    }

    fn playlist_name(&self, _playlist: PlaylistHandle) -> Option<String> {
        None
    }
    fn playlist_tracks(&self, playlist: PlaylistHandle) -> Vec<TrackHandle>;

    fn track_name(&self, _track: TrackHandle) -> Option<String> {
        None
    }
    fn track_duration(&self, _track: TrackHandle) -> Option<Duration> {
        None
    }
    fn track_popularity(&self, _track: TrackHandle) -> Option<u8> {
        None
    }
    fn track_disc(&self, _track: TrackHandle) -> Option<u32> {
        None
    }
    fn track_artists(&self, _track: TrackHandle) -> Vec<ArtistHandle> {
        Vec::new()
    }
    fn track_album(&self, _track: TrackHandle) -> Option<AlbumHandle> {
        None
    }
    fn track_is_starred(&self, _track: TrackHandle) -> bool {
        false
    }
    fn track_set_starred(&mut self, _track: TrackHandle, _starred: bool) {}

    fn album_name(&self, _album: AlbumHandle) -> Option<String> {
        None
    }
    fn album_artist(&self, _album: AlbumHandle) -> Option<ArtistHandle> {
        None
    }
    fn album_cover(&self, _album: AlbumHandle) -> Option<ImageId> {
        None
    }

    fn artist_name(&self, _artist: ArtistHandle) -> Option<String> {
        None
    }

    /// Creates an image with one reference held for the caller.
    fn image_create(&mut self, _id: &ImageId) -> Option<ImageHandle> {
        None
    }
    fn image_data(&self, _image: ImageHandle) -> Option<Vec<u8>> {
        None
    }

    /// Starts an album browse with one reference held for the caller.
    fn album_browse_create(&mut self, _album: AlbumHandle) -> Option<AlbumBrowseHandle> {
        None
    }
    fn album_browse_copyrights(&self, _browse: AlbumBrowseHandle) -> Vec<String> {
        Vec::new()
    }
    fn album_browse_review(&self, _browse: AlbumBrowseHandle) -> Option<String> {
        None
    }
    fn album_browse_tracks(&self, _browse: AlbumBrowseHandle) -> Vec<TrackHandle> {
        Vec::new()
    }

    /// Starts an artist browse with one reference held for the caller.
    fn artist_browse_create(&mut self, _artist: ArtistHandle) -> Option<ArtistBrowseHandle> {
        None
    }
    fn artist_browse_portraits(&self, _browse: ArtistBrowseHandle) -> Vec<ImageId> {
        Vec::new()
    }
    fn artist_browse_tracks(&self, _browse: ArtistBrowseHandle) -> Vec<TrackHandle> {
        Vec::new()
    }
    fn artist_browse_albums(&self, _browse: ArtistBrowseHandle) -> Vec<AlbumHandle> {
        Vec::new()
    }
    fn artist_browse_similar_artists(&self, _browse: ArtistBrowseHandle) -> Vec<ArtistHandle> {
        Vec::new()
    }
    fn artist_browse_biography(&self, _browse: ArtistBrowseHandle) -> Option<String> {
        None
    }
}
