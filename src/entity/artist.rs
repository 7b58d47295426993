use std::fmt;

use super::{Album, Image, LoadState, Loadable, Track};
use crate::provider::{ArtistBrowseHandle, ArtistHandle};
use crate::session::Context;

pub struct Artist {
    entity: Loadable<ArtistHandle>,
}

impl Artist {
    pub fn new(ctx: &Context) -> Self {
        Self {
            entity: Loadable::new(ctx),
        }
    }

    pub fn bound(ctx: &Context, handle: ArtistHandle) -> Self {
        Self {
            entity: Loadable::bound(ctx, handle),
        }
    }

    pub fn load(&mut self, handle: ArtistHandle) -> bool {
        self.entity.load(handle)
    }

    pub fn unload(&mut self) {
        self.entity.unload();
    }

    pub fn handle(&self) -> Option<ArtistHandle> {
        self.entity.handle()
    }

    pub fn state(&self) -> LoadState {
        self.entity.state()
    }

    pub fn is_loading(&self) -> bool {
        self.entity.is_loading()
    }

    pub fn name(&self) -> Option<String> {
        self.entity.query(|p, h| p.artist_name(h))
    }

    pub fn browse(&self) -> Option<ArtistBrowse> {
        ArtistBrowse::start(self, None)
    }

    /// Starts a browse and runs `on_complete` on the pump thread once it has
    /// loaded. Dropping the browse first means it never runs.
    pub fn browse_with(&self, on_complete: impl FnOnce() + 'static) -> Option<ArtistBrowse> {
        ArtistBrowse::start(self, Some(Box::new(on_complete)))
    }
}

impl Clone for Artist {
    fn clone(&self) -> Self {
        let ctx = self.entity.context();
        match self.handle() {
            Some(handle) => Artist::bound(ctx, handle),
            None => Artist::new(ctx),
        }
    }
}

impl fmt::Debug for Artist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artist")
            .field("handle", &self.handle())
            .finish()
    }
}

/// Everything the catalog knows about one artist, fetched in one request.
pub struct ArtistBrowse {
    entity: Loadable<ArtistBrowseHandle>,
    artist: Artist,
}

impl ArtistBrowse {
    fn start(artist: &Artist, on_complete: Option<Box<dyn FnOnce()>>) -> Option<Self> {
        let target = artist.handle()?;
        let ctx = artist.entity.context();
        let handle = ctx
            .provider()
            .with_mut(|p| p.artist_browse_create(target))
            .flatten()?;

        let mut entity = Loadable::new(ctx);
        entity.adopt(handle, on_complete);
        Some(Self {
            entity,
            artist: artist.clone(),
        })
    }

    pub fn is_loading(&self) -> bool {
        self.entity.is_loading()
    }

    pub fn state(&self) -> LoadState {
        self.entity.state()
    }

    pub fn artist(&self) -> &Artist {
        &self.artist
    }

    pub fn portraits(&self) -> Vec<Image> {
        let ctx = self.entity.context();
        self.entity
            .query_list(|p, h| p.artist_browse_portraits(h))
            .iter()
            .filter_map(|id| Image::create(ctx, id))
            .collect()
    }

    pub fn tracks(&self) -> Vec<Track> {
        let ctx = self.entity.context();
        self.entity
            .query_list(|p, h| p.artist_browse_tracks(h))
            .into_iter()
            .map(|t| Track::bound(ctx, t))
            .collect()
    }

    pub fn albums(&self) -> Vec<Album> {
        let ctx = self.entity.context();
        self.entity
            .query_list(|p, h| p.artist_browse_albums(h))
            .into_iter()
            .map(|a| Album::bound(ctx, a))
            .collect()
    }

    pub fn similar_artists(&self) -> Vec<Artist> {
        let ctx = self.entity.context();
        self.entity
            .query_list(|p, h| p.artist_browse_similar_artists(h))
            .into_iter()
            .map(|a| Artist::bound(ctx, a))
            .collect()
    }

    pub fn biography(&self) -> Option<String> {
        self.entity.query(|p, h| p.artist_browse_biography(h))
    }
}

impl fmt::Debug for ArtistBrowse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtistBrowse")
            .field("handle", &self.entity.handle())
            .field("artist", &self.artist.handle())
            .finish()
    }
}
