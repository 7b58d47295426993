use std::fmt;
use std::time::Duration;

use super::{Album, Artist, LoadState, Loadable};
use crate::provider::TrackHandle;
use crate::session::Context;

/// A single track. Every `Track` value holds its own provider reference, so
/// cloning one takes another reference on the same handle.
pub struct Track {
    entity: Loadable<TrackHandle>,
}

impl Track {
    pub fn new(ctx: &Context) -> Self {
        Self {
            entity: Loadable::new(ctx),
        }
    }

    pub fn bound(ctx: &Context, handle: TrackHandle) -> Self {
        Self {
            entity: Loadable::bound(ctx, handle),
        }
    }

    pub fn load(&mut self, handle: TrackHandle) -> bool {
        self.entity.load(handle)
    }

    pub fn unload(&mut self) {
        self.entity.unload();
    }

    pub fn handle(&self) -> Option<TrackHandle> {
        self.entity.handle()
    }

    pub fn state(&self) -> LoadState {
        self.entity.state()
    }

    pub fn is_loading(&self) -> bool {
        self.entity.is_loading()
    }

    pub fn name(&self) -> Option<String> {
        self.entity.query(|p, h| p.track_name(h))
    }

    pub fn duration(&self) -> Option<Duration> {
        self.entity.query(|p, h| p.track_duration(h))
    }

    pub fn popularity(&self) -> Option<u8> {
        self.entity.query(|p, h| p.track_popularity(h))
    }

    pub fn disc(&self) -> Option<u32> {
        self.entity.query(|p, h| p.track_disc(h))
    }

    pub fn artists(&self) -> Vec<Artist> {
        let ctx = self.entity.context();
        self.entity
            .query_list(|p, h| p.track_artists(h))
            .into_iter()
            .map(|artist| Artist::bound(ctx, artist))
            .collect()
    }

    pub fn album(&self) -> Option<Album> {
        let album = self.entity.query(|p, h| p.track_album(h))?;
        Some(Album::bound(self.entity.context(), album))
    }

    pub fn is_starred(&self) -> bool {
        self.entity.query(|p, h| Some(p.track_is_starred(h))).unwrap_or(false)
    }

    pub fn set_starred(&self, starred: bool) {
        if let Some(handle) = self.handle() {
            self.entity
                .context()
                .provider()
                .with_mut(|p| p.track_set_starred(handle, starred));
        }
    }

    /// One-line description used by tree dumps: `Track [name] [m]mins [s]secs`.
    pub fn describe(&self) -> String {
        let secs = self.duration().map_or(0, |d| d.as_secs());
        format!(
            "Track [{}] [{}]mins [{}]secs",
            self.name().unwrap_or_default(),
            secs / 60,
            secs % 60
        )
    }
}

impl Clone for Track {
    fn clone(&self) -> Self {
        let ctx = self.entity.context();
        match self.handle() {
            Some(handle) => Track::bound(ctx, handle),
            None => Track::new(ctx),
        }
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("handle", &self.handle())
            .finish()
    }
}
