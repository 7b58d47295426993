use std::collections::BTreeMap;
use std::fmt;

use super::{Artist, Image, LoadState, Loadable, Track};
use crate::provider::{AlbumBrowseHandle, AlbumHandle};
use crate::session::Context;

pub struct Album {
    entity: Loadable<AlbumHandle>,
}

impl Album {
    pub fn new(ctx: &Context) -> Self {
        Self {
            entity: Loadable::new(ctx),
        }
    }

    pub fn bound(ctx: &Context, handle: AlbumHandle) -> Self {
        Self {
            entity: Loadable::bound(ctx, handle),
        }
    }

    pub fn load(&mut self, handle: AlbumHandle) -> bool {
        self.entity.load(handle)
    }

    pub fn unload(&mut self) {
        self.entity.unload();
    }

    pub fn handle(&self) -> Option<AlbumHandle> {
        self.entity.handle()
    }

    pub fn state(&self) -> LoadState {
        self.entity.state()
    }

    pub fn is_loading(&self) -> bool {
        self.entity.is_loading()
    }

    pub fn name(&self) -> Option<String> {
        self.entity.query(|p, h| p.album_name(h))
    }

    pub fn artist(&self) -> Option<Artist> {
        let artist = self.entity.query(|p, h| p.album_artist(h))?;
        Some(Artist::bound(self.entity.context(), artist))
    }

    /// The cover art. The cover id is only known once the album has loaded.
    pub fn cover(&self) -> Option<Image> {
        if self.state() != LoadState::Loaded {
            return None;
        }
        let id = self.entity.query(|p, h| p.album_cover(h))?;
        Image::create(self.entity.context(), &id)
    }

    pub fn browse(&self) -> Option<AlbumBrowse> {
        AlbumBrowse::start(self, None)
    }

    /// Starts a browse and runs `on_complete` on the pump thread once it has
    /// loaded. Dropping the browse first means it never runs.
    pub fn browse_with(&self, on_complete: impl FnOnce() + 'static) -> Option<AlbumBrowse> {
        AlbumBrowse::start(self, Some(Box::new(on_complete)))
    }
}

impl Clone for Album {
    fn clone(&self) -> Self {
        let ctx = self.entity.context();
        match self.handle() {
            Some(handle) => Album::bound(ctx, handle),
            None => Album::new(ctx),
        }
    }
}

impl fmt::Debug for Album {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Album")
            .field("handle", &self.handle())
            .finish()
    }
}

/// Tracks of an album that share a disc number.
#[derive(Debug, Clone)]
pub struct Disc {
    index: u32,
    tracks: Vec<Track>,
}

impl Disc {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn track(&self, position: usize) -> Option<&Track> {
        self.tracks.get(position)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }
}

pub struct AlbumBrowse {
    entity: Loadable<AlbumBrowseHandle>,
    album: Album,
}

impl AlbumBrowse {
    fn start(album: &Album, on_complete: Option<Box<dyn FnOnce()>>) -> Option<Self> {
        let target = album.handle()?;
        let ctx = album.entity.context();
        let handle = ctx
            .provider()
            .with_mut(|p| p.album_browse_create(target))
            .flatten()?;

        let mut entity = Loadable::new(ctx);
        entity.adopt(handle, on_complete);
        Some(Self {
            entity,
            album: album.clone(),
        })
    }

    pub fn is_loading(&self) -> bool {
        self.entity.is_loading()
    }

    pub fn state(&self) -> LoadState {
        self.entity.state()
    }

    pub fn album(&self) -> &Album {
        &self.album
    }

    pub fn artist(&self) -> Option<Artist> {
        self.album.artist()
    }

    pub fn copyrights(&self) -> Vec<String> {
        self.entity.query_list(|p, h| p.album_browse_copyrights(h))
    }

    pub fn review(&self) -> Option<String> {
        self.entity.query(|p, h| p.album_browse_review(h))
    }

    pub fn tracks(&self) -> Vec<Track> {
        let ctx = self.entity.context();
        self.entity
            .query_list(|p, h| p.album_browse_tracks(h))
            .into_iter()
            .map(|t| Track::bound(ctx, t))
            .collect()
    }

    /// Album tracks grouped by disc number, in disc order. Tracks whose disc
    /// number is not known yet land on disc 1.
    pub fn discs(&self) -> Vec<Disc> {
        let mut discs: BTreeMap<u32, Vec<Track>> = BTreeMap::new();
        for track in self.tracks() {
            let index = track.disc().unwrap_or(1);
            discs.entry(index).or_default().push(track);
        }
        discs
            .into_iter()
            .map(|(index, tracks)| Disc { index, tracks })
            .collect()
    }
}

impl fmt::Debug for AlbumBrowse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlbumBrowse")
            .field("handle", &self.entity.handle())
            .field("album", &self.album.handle())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ObjectEvent, RemoteHandle};
    use crate::testing::{sample_fixture, simulated_context};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn cover_waits_for_album_to_load() {
        let (ctx, probe) = simulated_context(sample_fixture());
        let handle = probe.album("al1").unwrap();
        let album = Album::bound(&ctx, handle);
        assert!(album.cover().is_none());

        probe.set_loaded(handle.id());
        let cover = album.cover().expect("cover once loaded");
        assert!(cover.is_loading());

        probe.set_loaded(cover.handle().unwrap().id());
        assert_eq!(cover.data().as_deref(), Some(&b"cover-al1"[..]));
    }

    #[test]
    fn browse_groups_tracks_by_disc() {
        let (ctx, probe) = simulated_context(sample_fixture());
        let album = Album::bound(&ctx, probe.album("al1").unwrap());

        let browse = album.browse().expect("browse starts");
        let discs = browse.discs();
        assert_eq!(discs.len(), 2);
        assert_eq!(discs[0].index(), 1);
        assert_eq!(discs[0].num_tracks(), 1);
        assert_eq!(discs[1].index(), 2);
        assert_eq!(discs[1].track(0).and_then(Track::name).as_deref(), Some("Wait"));
        assert_eq!(browse.review().as_deref(), Some("Widescreen synth pop."));
    }

    #[test]
    fn browse_continuation_fires_on_completion() {
        let (ctx, probe) = simulated_context(sample_fixture());
        let album = Album::bound(&ctx, probe.album("al1").unwrap());
        let done = Rc::new(Cell::new(false));

        let flag = Rc::clone(&done);
        let browse = album.browse_with(move || flag.set(true)).unwrap();
        let handle = browse.entity.handle().unwrap();
        assert_eq!(probe.ref_count(handle.id()), 1);

        ctx.dispatcher().dispatch(handle.id(), &ObjectEvent::Loaded);
        assert!(done.get());
        assert_eq!(browse.state(), LoadState::Loaded);

        drop(browse);
        assert_eq!(probe.ref_count(handle.id()), 0);
    }
}
