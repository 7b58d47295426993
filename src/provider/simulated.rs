// In-memory catalog provider driven by a TOML fixture
// One process_events() call is one tick; referenced objects finish loading after `load_after` ticks

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::{
    AlbumBrowseHandle, AlbumHandle, ArtistBrowseHandle, ArtistHandle, Bitrate, ConnectionState,
    ContainerHandle, EventBatch, FlatRecord, HandleId, ImageHandle, ImageId, ObjectEvent,
    PlaylistHandle, Provider, ProviderError, ProviderEvent, ProviderResult, RemoteHandle,
    SessionCallback, TrackHandle,
};
use crate::session::PumpSignal;

const IDLE_TIMEOUT: Duration = Duration::from_secs(1);

fn one() -> u32 {
    1
}

fn yes() -> bool {
    true
}

fn default_next_timeout_ms() -> u64 {
    50
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountFixture {
    pub username: String,
    pub password: String,
}

/// One container record. `playlist` entries name a playlist by fixture id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordFixture {
    Playlist {
        id: String,
    },
    FolderStart {
        name: String,
        #[serde(default)]
        group_id: u64,
    },
    FolderEnd,
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerFixture {
    #[serde(default = "one")]
    pub load_after: u32,
    #[serde(default)]
    pub records: Vec<RecordFixture>,
}

impl Default for ContainerFixture {
    fn default() -> Self {
        Self {
            load_after: one(),
            records: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistFixture {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tracks: Vec<String>,
    #[serde(default = "one")]
    pub load_after: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackFixture {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub popularity: u8,
    pub disc: Option<u32>,
    #[serde(default)]
    pub artists: Vec<String>,
    pub album: Option<String>,
    #[serde(default)]
    pub starred: bool,
    #[serde(default = "yes")]
    pub playable: bool,
    #[serde(default = "one")]
    pub load_after: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumFixture {
    pub id: String,
    pub name: String,
    pub artist: Option<String>,
    pub cover: Option<String>,
    pub review: Option<String>,
    #[serde(default)]
    pub copyrights: Vec<String>,
    #[serde(default)]
    pub tracks: Vec<String>,
    #[serde(default = "one")]
    pub load_after: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistFixture {
    pub id: String,
    pub name: String,
    pub biography: Option<String>,
    #[serde(default)]
    pub portraits: Vec<String>,
    #[serde(default)]
    pub tracks: Vec<String>,
    #[serde(default)]
    pub albums: Vec<String>,
    #[serde(default)]
    pub similar: Vec<String>,
    #[serde(default = "one")]
    pub load_after: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFixture {
    pub id: String,
    pub data: String,
    #[serde(default = "one")]
    pub load_after: u32,
}

/// Everything the simulated catalog serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFixture {
    /// Delay before the wake signal fires for queued callbacks. Zero wakes inline.
    #[serde(default)]
    pub latency_ms: u64,
    /// Pump delay reported while something is still loading.
    #[serde(default = "default_next_timeout_ms")]
    pub next_timeout_ms: u64,
    #[serde(default = "one")]
    pub browse_load_after: u32,
    pub account: Option<AccountFixture>,
    #[serde(default)]
    pub container: ContainerFixture,
    #[serde(default)]
    pub playlists: Vec<PlaylistFixture>,
    #[serde(default)]
    pub tracks: Vec<TrackFixture>,
    #[serde(default)]
    pub albums: Vec<AlbumFixture>,
    #[serde(default)]
    pub artists: Vec<ArtistFixture>,
    #[serde(default)]
    pub images: Vec<ImageFixture>,
}

impl CatalogFixture {
    pub fn from_toml(source: &str) -> Result<Self> {
        toml::from_str(source).context("invalid catalog fixture")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading catalog fixture {}", path.display()))?;
        Self::from_toml(&content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Track,
    Album,
    Artist,
    Image,
    Playlist,
    Container,
    AlbumBrowse,
    ArtistBrowse,
}

#[derive(Debug)]
struct Object {
    kind: Kind,
    /// Fixture id; for browses, the id of the browsed album or artist.
    key: String,
    load_after: u32,
    ready_at: Option<u32>,
    loaded: bool,
    refs: u32,
}

#[derive(Debug, Clone)]
struct Record {
    record: FlatRecord,
    folder_name: Option<String>,
    folder_id: Option<u64>,
}

struct SimState {
    fixture: CatalogFixture,
    signal: PumpSignal,
    objects: Vec<Object>,
    by_key: HashMap<(Kind, String), HandleId>,
    tick: u32,
    queue: VecDeque<ProviderEvent>,
    connection: ConnectionState,
    container: HandleId,
    starred_list: HandleId,
    records: Vec<Record>,
    playlist_tracks: HashMap<HandleId, Vec<TrackHandle>>,
    starred: HashSet<HandleId>,
    player: Option<TrackHandle>,
    playing: bool,
    position_ms: u32,
    bitrate: Option<Bitrate>,
}

impl SimState {
    fn build(fixture: CatalogFixture, signal: PumpSignal) -> Self {
        let mut state = Self {
            fixture: fixture.clone(),
            signal,
            objects: Vec::new(),
            by_key: HashMap::new(),
            tick: 0,
            queue: VecDeque::new(),
            connection: ConnectionState::LoggedOut,
            container: HandleId::new(0),
            starred_list: HandleId::new(0),
            records: Vec::new(),
            playlist_tracks: HashMap::new(),
            starred: HashSet::new(),
            player: None,
            playing: false,
            position_ms: 0,
            bitrate: None,
        };

        for t in &fixture.tracks {
            let id = state.register(Kind::Track, &t.id, t.load_after);
            if t.starred {
                state.starred.insert(id);
            }
        }
        for a in &fixture.albums {
            state.register(Kind::Album, &a.id, a.load_after);
        }
        for a in &fixture.artists {
            state.register(Kind::Artist, &a.id, a.load_after);
        }
        for i in &fixture.images {
            state.register(Kind::Image, &i.id, i.load_after);
        }
        for p in &fixture.playlists {
            let id = state.register(Kind::Playlist, &p.id, p.load_after);
            let tracks = state.resolve_tracks(&p.tracks);
            state.playlist_tracks.insert(id, tracks);
        }
        state.container = state.register(Kind::Container, "root", fixture.container.load_after);
        state.starred_list = state.register(Kind::Playlist, "starred", 1);

        state.records = fixture
            .container
            .records
            .iter()
            .filter_map(|r| state.record(r))
            .collect();
        state
    }

    fn register(&mut self, kind: Kind, key: &str, load_after: u32) -> HandleId {
        let id = HandleId::new(self.objects.len() as u64 + 1);
        self.objects.push(Object {
            kind,
            key: key.to_string(),
            load_after,
            ready_at: None,
            loaded: load_after == 0,
            refs: 0,
        });
        self.by_key.insert((kind, key.to_string()), id);
        id
    }

    fn record(&self, fixture: &RecordFixture) -> Option<Record> {
        let plain = |record| Record {
            record,
            folder_name: None,
            folder_id: None,
        };
        Some(match fixture {
            RecordFixture::Playlist { id } => match self.lookup(Kind::Playlist, id) {
                Some(h) => plain(FlatRecord::Entry(PlaylistHandle::from_id(h))),
                None => {
                    warn!(playlist = %id, "container names an unknown playlist");
                    return None;
                }
            },
            RecordFixture::FolderStart { name, group_id } => Record {
                record: FlatRecord::FolderStart,
                folder_name: Some(name.clone()),
                folder_id: Some(*group_id),
            },
            RecordFixture::FolderEnd => plain(FlatRecord::FolderEnd),
            RecordFixture::Placeholder => plain(FlatRecord::Placeholder),
        })
    }

    fn lookup(&self, kind: Kind, key: &str) -> Option<HandleId> {
        self.by_key.get(&(kind, key.to_string())).copied()
    }

    fn resolve<H>(&self, kind: Kind, keys: &[String], wrap: fn(HandleId) -> H) -> Vec<H> {
        keys.iter()
            .filter_map(|k| self.lookup(kind, k))
            .map(wrap)
            .collect()
    }

    fn resolve_tracks(&self, keys: &[String]) -> Vec<TrackHandle> {
        self.resolve(Kind::Track, keys, TrackHandle::from_id)
    }

    fn object(&self, id: HandleId) -> Option<&Object> {
        let index = usize::try_from(id.raw()).ok()?.checked_sub(1)?;
        self.objects.get(index)
    }

    fn object_mut(&mut self, id: HandleId) -> Option<&mut Object> {
        let index = usize::try_from(id.raw()).ok()?.checked_sub(1)?;
        self.objects.get_mut(index)
    }

    fn key(&self, id: HandleId, kind: Kind) -> Option<&str> {
        self.object(id)
            .filter(|o| o.kind == kind)
            .map(|o| o.key.as_str())
    }

    fn track(&self, h: TrackHandle) -> Option<&TrackFixture> {
        let key = self.key(h.id(), Kind::Track)?;
        self.fixture.tracks.iter().find(|t| t.id == key)
    }

    fn album(&self, h: AlbumHandle) -> Option<&AlbumFixture> {
        let key = self.key(h.id(), Kind::Album)?;
        self.fixture.albums.iter().find(|a| a.id == key)
    }

    fn artist(&self, h: ArtistHandle) -> Option<&ArtistFixture> {
        let key = self.key(h.id(), Kind::Artist)?;
        self.fixture.artists.iter().find(|a| a.id == key)
    }

    fn playlist(&self, h: PlaylistHandle) -> Option<&PlaylistFixture> {
        let key = self.key(h.id(), Kind::Playlist)?;
        self.fixture.playlists.iter().find(|p| p.id == key)
    }

    fn album_browse(&self, h: AlbumBrowseHandle) -> Option<&AlbumFixture> {
        let key = self.key(h.id(), Kind::AlbumBrowse)?;
        self.fixture.albums.iter().find(|a| a.id == key)
    }

    fn artist_browse(&self, h: ArtistBrowseHandle) -> Option<&ArtistFixture> {
        let key = self.key(h.id(), Kind::ArtistBrowse)?;
        self.fixture.artists.iter().find(|a| a.id == key)
    }

    fn add_ref(&mut self, id: HandleId) {
        let tick = self.tick;
        match self.object_mut(id) {
            Some(object) => {
                object.refs += 1;
                if !object.loaded && object.ready_at.is_none() {
                    object.ready_at = Some(tick + object.load_after);
                }
            }
            None => warn!(handle = %id, "add_ref on unknown handle"),
        }
    }

    fn create_browse(&mut self, kind: Kind, key: &str) -> HandleId {
        let load_after = self.fixture.browse_load_after;
        let id = HandleId::new(self.objects.len() as u64 + 1);
        self.objects.push(Object {
            kind,
            key: key.to_string(),
            load_after,
            ready_at: None,
            loaded: load_after == 0,
            refs: 0,
        });
        self.add_ref(id);
        id
    }

    fn enqueue(&mut self, event: ProviderEvent) {
        self.queue.push_back(event);
        let signal = self.signal.clone();
        match self.fixture.latency_ms {
            0 => signal.request(),
            ms => {
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(ms));
                    signal.request();
                });
            }
        }
    }

    /// Advances one tick and returns everything that became ready.
    fn advance(&mut self) -> Vec<ProviderEvent> {
        self.tick += 1;
        let tick = self.tick;
        let mut ready = Vec::new();
        for (index, object) in self.objects.iter_mut().enumerate() {
            if object.loaded || object.ready_at.map_or(true, |at| at > tick) {
                continue;
            }
            object.loaded = true;
            let event = match object.kind {
                Kind::Container => ObjectEvent::ContainerLoaded,
                Kind::Playlist => ObjectEvent::PlaylistStateChanged,
                _ => ObjectEvent::Loaded,
            };
            ready.push(ProviderEvent::Object {
                target: HandleId::new(index as u64 + 1),
                event,
            });
        }
        ready
    }

    fn has_pending_loads(&self) -> bool {
        self.objects
            .iter()
            .any(|o| !o.loaded && o.ready_at.is_some())
    }
}

/// A [`Provider`] backed by a [`CatalogFixture`].
pub struct SimulatedProvider {
    state: Rc<RefCell<SimState>>,
}

impl SimulatedProvider {
    pub fn new(fixture: CatalogFixture, signal: PumpSignal) -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState::build(fixture, signal))),
        }
    }

    /// A handle on the same state, for tests and diagnostics.
    pub fn probe(&self) -> CatalogProbe {
        CatalogProbe {
            state: Rc::clone(&self.state),
        }
    }
}

impl Provider for SimulatedProvider {
    fn process_events(&mut self) -> EventBatch {
        let mut state = self.state.borrow_mut();
        let mut events: Vec<ProviderEvent> = state.queue.drain(..).collect();
        events.extend(state.advance());
        let next_timeout = if state.has_pending_loads() {
            Duration::from_millis(state.fixture.next_timeout_ms)
        } else {
            IDLE_TIMEOUT
        };
        trace!(tick = state.tick, events = events.len(), "simulated tick");
        EventBatch {
            events,
            next_timeout,
        }
    }

    fn login(&mut self, username: &str, password: &str, _remember_me: bool) {
        let mut state = self.state.borrow_mut();
        let accepted = state
            .fixture
            .account
            .as_ref()
            .map_or(true, |a| a.username == username && a.password == password);
        if !accepted {
            state.enqueue(ProviderEvent::Session(SessionCallback::LoggedIn(Err(
                ProviderError::BadCredentials,
            ))));
            return;
        }
        state.connection = ConnectionState::LoggedIn;
        state.enqueue(ProviderEvent::Session(SessionCallback::LoggedIn(Ok(()))));
        state.enqueue(ProviderEvent::Session(SessionCallback::LogMessage(format!(
            "simulated login for {username}\n"
        ))));
    }

    fn logout(&mut self) {
        let mut state = self.state.borrow_mut();
        state.connection = ConnectionState::LoggedOut;
        state.enqueue(ProviderEvent::Session(SessionCallback::LoggedOut));
    }

    fn connection_state(&self) -> ConnectionState {
        self.state.borrow().connection
    }

    fn add_ref(&mut self, handle: HandleId) {
        self.state.borrow_mut().add_ref(handle);
    }

    fn release(&mut self, handle: HandleId) {
        let mut state = self.state.borrow_mut();
        match state.object_mut(handle) {
            Some(object) if object.refs > 0 => object.refs -= 1,
            _ => warn!(handle = %handle, "release without a matching add_ref"),
        }
    }

    fn is_loaded(&self, handle: HandleId) -> bool {
        self.state.borrow().object(handle).map_or(false, |o| o.loaded)
    }

    fn player_load(&mut self, track: TrackHandle) -> ProviderResult<()> {
        let mut state = self.state.borrow_mut();
        match state.track(track) {
            Some(t) if t.playable => {}
            _ => return Err(ProviderError::TrackNotPlayable),
        }
        state.player = Some(track);
        state.position_ms = 0;
        Ok(())
    }

    fn player_unload(&mut self) {
        let mut state = self.state.borrow_mut();
        state.player = None;
        state.playing = false;
    }

    fn player_play(&mut self, play: bool) {
        let mut state = self.state.borrow_mut();
        state.playing = play && state.player.is_some();
    }

    fn player_seek(&mut self, offset_ms: u32) {
        self.state.borrow_mut().position_ms = offset_ms;
    }

    fn player_prefetch(&mut self, track: TrackHandle) -> ProviderResult<()> {
        match self.state.borrow().track(track) {
            Some(t) if t.playable => Ok(()),
            _ => Err(ProviderError::TrackNotPlayable),
        }
    }

    fn set_preferred_bitrate(&mut self, bitrate: Bitrate) {
        debug!(?bitrate, "preferred bitrate set");
        self.state.borrow_mut().bitrate = Some(bitrate);
    }

    fn session_container(&mut self) -> Option<ContainerHandle> {
        let state = self.state.borrow();
        (state.connection == ConnectionState::LoggedIn)
            .then(|| ContainerHandle::from_id(state.container))
    }

    fn starred_playlist(&mut self) -> Option<PlaylistHandle> {
        let state = self.state.borrow();
        (state.connection == ConnectionState::LoggedIn)
            .then(|| PlaylistHandle::from_id(state.starred_list))
    }

    fn container_num_records(&self, container: ContainerHandle) -> usize {
        let state = self.state.borrow();
        if container.id() == state.container {
            state.records.len()
        } else {
            0
        }
    }

    fn container_record(&self, container: ContainerHandle, index: usize) -> FlatRecord {
        let state = self.state.borrow();
        if container.id() != state.container {
            return FlatRecord::Placeholder;
        }
        state
            .records
            .get(index)
            .map_or(FlatRecord::Placeholder, |r| r.record)
    }

    fn container_folder_name(&self, container: ContainerHandle, index: usize) -> Option<String> {
        let state = self.state.borrow();
        if container.id() != state.container {
            return None;
        }
        state.records.get(index)?.folder_name.clone()
    }

    fn container_folder_id(&self, container: ContainerHandle, index: usize) -> Option<u64> {
        let state = self.state.borrow();
        if container.id() != state.container {
            return None;
        }
        state.records.get(index)?.folder_id
    }

    fn playlist_name(&self, playlist: PlaylistHandle) -> Option<String> {
        let state = self.state.borrow();
        if playlist.id() == state.starred_list {
            return Some("Starred".to_string());
        }
        state.playlist(playlist).map(|p| p.name.clone())
    }

    fn playlist_tracks(&self, playlist: PlaylistHandle) -> Vec<TrackHandle> {
        let state = self.state.borrow();
        if playlist.id() == state.starred_list {
            let mut starred: Vec<_> = state.starred.iter().copied().collect();
            starred.sort();
            return starred.into_iter().map(TrackHandle::from_id).collect();
        }
        state
            .playlist_tracks
            .get(&playlist.id())
            .cloned()
            .unwrap_or_default()
    }

    fn track_name(&self, track: TrackHandle) -> Option<String> {
        self.state.borrow().track(track).map(|t| t.name.clone())
    }

    fn track_duration(&self, track: TrackHandle) -> Option<Duration> {
        self.state
            .borrow()
            .track(track)
            .map(|t| Duration::from_millis(t.duration_ms))
    }

    fn track_popularity(&self, track: TrackHandle) -> Option<u8> {
        self.state.borrow().track(track).map(|t| t.popularity)
    }

    fn track_disc(&self, track: TrackHandle) -> Option<u32> {
        self.state.borrow().track(track).and_then(|t| t.disc)
    }

    fn track_artists(&self, track: TrackHandle) -> Vec<ArtistHandle> {
        let state = self.state.borrow();
        state.track(track).map_or_else(Vec::new, |t| {
            state.resolve(Kind::Artist, &t.artists, ArtistHandle::from_id)
        })
    }

    fn track_album(&self, track: TrackHandle) -> Option<AlbumHandle> {
        let state = self.state.borrow();
        let album = state.track(track)?.album.as_deref()?;
        state.lookup(Kind::Album, album).map(AlbumHandle::from_id)
    }

    fn track_is_starred(&self, track: TrackHandle) -> bool {
        self.state.borrow().starred.contains(&track.id())
    }

    fn track_set_starred(&mut self, track: TrackHandle, starred: bool) {
        let mut state = self.state.borrow_mut();
        let changed = if starred {
            state.starred.insert(track.id())
        } else {
            state.starred.remove(&track.id())
        };
        if changed {
            let list = PlaylistHandle::from_id(state.starred_list);
            state.enqueue(ProviderEvent::object(list, ObjectEvent::TracksChanged));
        }
    }

    fn album_name(&self, album: AlbumHandle) -> Option<String> {
        self.state.borrow().album(album).map(|a| a.name.clone())
    }

    fn album_artist(&self, album: AlbumHandle) -> Option<ArtistHandle> {
        let state = self.state.borrow();
        let artist = state.album(album)?.artist.as_deref()?;
        state.lookup(Kind::Artist, artist).map(ArtistHandle::from_id)
    }

    fn album_cover(&self, album: AlbumHandle) -> Option<ImageId> {
        let state = self.state.borrow();
        state.album(album)?.cover.as_deref().map(ImageId::from)
    }

    fn artist_name(&self, artist: ArtistHandle) -> Option<String> {
        self.state.borrow().artist(artist).map(|a| a.name.clone())
    }

    fn image_create(&mut self, id: &ImageId) -> Option<ImageHandle> {
        let mut state = self.state.borrow_mut();
        let handle = state.lookup(Kind::Image, &id.0)?;
        state.add_ref(handle);
        Some(ImageHandle::from_id(handle))
    }

    fn image_data(&self, image: ImageHandle) -> Option<Vec<u8>> {
        let state = self.state.borrow();
        let key = state.key(image.id(), Kind::Image)?;
        state
            .fixture
            .images
            .iter()
            .find(|i| i.id == key)
            .map(|i| i.data.as_bytes().to_vec())
    }

    fn album_browse_create(&mut self, album: AlbumHandle) -> Option<AlbumBrowseHandle> {
        let mut state = self.state.borrow_mut();
        let key = state.key(album.id(), Kind::Album)?.to_string();
        Some(AlbumBrowseHandle::from_id(
            state.create_browse(Kind::AlbumBrowse, &key),
        ))
    }

    fn album_browse_copyrights(&self, browse: AlbumBrowseHandle) -> Vec<String> {
        self.state
            .borrow()
            .album_browse(browse)
            .map(|a| a.copyrights.clone())
            .unwrap_or_default()
    }

    fn album_browse_review(&self, browse: AlbumBrowseHandle) -> Option<String> {
        self.state.borrow().album_browse(browse)?.review.clone()
    }

    fn album_browse_tracks(&self, browse: AlbumBrowseHandle) -> Vec<TrackHandle> {
        let state = self.state.borrow();
        state
            .album_browse(browse)
            .map_or_else(Vec::new, |a| state.resolve_tracks(&a.tracks))
    }

    fn artist_browse_create(&mut self, artist: ArtistHandle) -> Option<ArtistBrowseHandle> {
        let mut state = self.state.borrow_mut();
        let key = state.key(artist.id(), Kind::Artist)?.to_string();
        Some(ArtistBrowseHandle::from_id(
            state.create_browse(Kind::ArtistBrowse, &key),
        ))
    }

    fn artist_browse_portraits(&self, browse: ArtistBrowseHandle) -> Vec<ImageId> {
        self.state
            .borrow()
            .artist_browse(browse)
            .map(|a| a.portraits.iter().map(|p| ImageId::from(p.as_str())).collect())
            .unwrap_or_default()
    }

    fn artist_browse_tracks(&self, browse: ArtistBrowseHandle) -> Vec<TrackHandle> {
        let state = self.state.borrow();
        state
            .artist_browse(browse)
            .map_or_else(Vec::new, |a| state.resolve_tracks(&a.tracks))
    }

    fn artist_browse_albums(&self, browse: ArtistBrowseHandle) -> Vec<AlbumHandle> {
        let state = self.state.borrow();
        state.artist_browse(browse).map_or_else(Vec::new, |a| {
            state.resolve(Kind::Album, &a.albums, AlbumHandle::from_id)
        })
    }

    fn artist_browse_similar_artists(&self, browse: ArtistBrowseHandle) -> Vec<ArtistHandle> {
        let state = self.state.borrow();
        state.artist_browse(browse).map_or_else(Vec::new, |a| {
            state.resolve(Kind::Artist, &a.similar, ArtistHandle::from_id)
        })
    }

    fn artist_browse_biography(&self, browse: ArtistBrowseHandle) -> Option<String> {
        self.state.borrow().artist_browse(browse)?.biography.clone()
    }
}

/// Read and poke access to a [`SimulatedProvider`]'s state from outside the
/// session.
#[derive(Clone)]
pub struct CatalogProbe {
    state: Rc<RefCell<SimState>>,
}

impl CatalogProbe {
    fn find(&self, kind: Kind, key: &str) -> Option<HandleId> {
        self.state.borrow().lookup(kind, key)
    }

    pub fn track(&self, id: &str) -> Option<TrackHandle> {
        self.find(Kind::Track, id).map(TrackHandle::from_id)
    }

    pub fn album(&self, id: &str) -> Option<AlbumHandle> {
        self.find(Kind::Album, id).map(AlbumHandle::from_id)
    }

    pub fn artist(&self, id: &str) -> Option<ArtistHandle> {
        self.find(Kind::Artist, id).map(ArtistHandle::from_id)
    }

    pub fn playlist(&self, id: &str) -> Option<PlaylistHandle> {
        self.find(Kind::Playlist, id).map(PlaylistHandle::from_id)
    }

    pub fn container(&self) -> Option<ContainerHandle> {
        self.find(Kind::Container, "root").map(ContainerHandle::from_id)
    }

    pub fn ref_count(&self, handle: HandleId) -> u32 {
        self.state.borrow().object(handle).map_or(0, |o| o.refs)
    }

    pub fn is_loaded(&self, handle: HandleId) -> bool {
        self.state.borrow().object(handle).map_or(false, |o| o.loaded)
    }

    /// Marks `handle` loaded without queuing a callback.
    pub fn set_loaded(&self, handle: HandleId) {
        if let Some(object) = self.state.borrow_mut().object_mut(handle) {
            object.loaded = true;
        }
    }

    pub fn load_all_tracks(&self) {
        for object in self.state.borrow_mut().objects.iter_mut() {
            if object.kind == Kind::Track {
                object.loaded = true;
            }
        }
    }

    /// Queues `event` for the next pump and raises the wake signal.
    pub fn push_event(&self, event: ProviderEvent) {
        self.state.borrow_mut().enqueue(event);
    }

    /// Replaces the container's records. Folders lose their names.
    pub fn set_container_records(&self, records: Vec<FlatRecord>) {
        self.state.borrow_mut().records = records
            .into_iter()
            .map(|record| Record {
                record,
                folder_name: None,
                folder_id: None,
            })
            .collect();
    }

    pub fn set_playlist_tracks(&self, playlist: PlaylistHandle, tracks: Vec<TrackHandle>) {
        self.state
            .borrow_mut()
            .playlist_tracks
            .insert(playlist.id(), tracks);
    }

    pub fn player_loaded(&self) -> Option<TrackHandle> {
        self.state.borrow().player
    }

    pub fn is_playing(&self) -> bool {
        self.state.borrow().playing
    }

    pub fn position_ms(&self) -> u32 {
        self.state.borrow().position_ms
    }

    pub fn preferred_bitrate(&self) -> Option<Bitrate> {
        self.state.borrow().bitrate
    }

    pub fn tick(&self) -> u32 {
        self.state.borrow().tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_fixture;

    fn provider() -> (SimulatedProvider, CatalogProbe) {
        let provider = SimulatedProvider::new(sample_fixture(), PumpSignal::new());
        let probe = provider.probe();
        (provider, probe)
    }

    #[test]
    fn fixture_parses_records() {
        let fixture = sample_fixture();
        assert_eq!(fixture.container.records.len(), 4);
        assert_eq!(
            fixture.container.records[1],
            RecordFixture::FolderStart {
                name: "Chill".into(),
                group_id: 42
            }
        );
    }

    #[test]
    fn unreferenced_objects_never_load() {
        let (mut provider, probe) = provider();
        let t1 = probe.track("t1").unwrap();
        for _ in 0..5 {
            assert!(provider.process_events().events.is_empty());
        }
        assert!(!provider.is_loaded(t1.id()));
    }

    #[test]
    fn referenced_object_loads_after_its_delay() {
        let (mut provider, probe) = provider();
        let p1 = probe.playlist("p1").unwrap();
        provider.add_ref(p1.id());

        assert!(provider.process_events().events.is_empty());
        let batch = provider.process_events();
        assert_eq!(
            batch.events,
            vec![ProviderEvent::object(p1, ObjectEvent::PlaylistStateChanged)]
        );
        assert!(provider.is_loaded(p1.id()));
        assert_eq!(batch.next_timeout, IDLE_TIMEOUT);
    }

    #[test]
    fn queued_callbacks_raise_the_signal() {
        let signal = PumpSignal::new();
        let mut provider = SimulatedProvider::new(sample_fixture(), signal.clone());
        provider.login("ana", "hunter2", true);
        assert!(signal.is_requested());

        let batch = provider.process_events();
        assert_eq!(
            batch.events[0],
            ProviderEvent::Session(SessionCallback::LoggedIn(Ok(())))
        );
        assert_eq!(provider.connection_state(), ConnectionState::LoggedIn);
    }

    #[test]
    fn starring_changes_the_starred_list() {
        let (mut provider, probe) = provider();
        let t2 = probe.track("t2").unwrap();
        provider.login("ana", "hunter2", false);
        let starred = provider.starred_playlist().unwrap();
        assert!(provider.playlist_tracks(starred).is_empty());

        provider.track_set_starred(t2, true);
        assert_eq!(provider.playlist_tracks(starred), vec![t2]);
        assert!(provider
            .process_events()
            .events
            .contains(&ProviderEvent::object(starred, ObjectEvent::TracksChanged)));
    }
}
