// Session façade - owns the provider connection and runs the event pump
// Everything here lives on the pumping thread; only PumpSignal crosses threads

mod context;
mod dispatch;
mod driver;
mod signal;

pub use context::Context;
pub use dispatch::{Delivery, Dispatcher, Subscription};
pub use driver::drive_until;
pub use signal::PumpSignal;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::entity::{Album, Artist, Loadable, Track};
use crate::error::{Error, Result};
use crate::playlist::{Playlist, PlaylistContainer};
use crate::provider::{
    Bitrate, ConnectionState, Provider, ProviderError, ProviderEvent, ProviderRef, ProviderResult,
    SessionCallback, TrackHandle,
};

/// Delay handed back by `pump()` once the connection is gone.
const IDLE_DELAY: Duration = Duration::from_secs(1);

/// What `initialize` hands to the provider when opening the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub application_key: Vec<u8>,
    pub cache_location: PathBuf,
    pub settings_location: PathBuf,
    pub user_agent: String,
    pub compress_playlists: bool,
    pub dont_save_metadata_for_playlists: bool,
    pub initially_unload_playlists: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            application_key: Vec::new(),
            cache_location: PathBuf::from("tmp"),
            settings_location: PathBuf::from("tmp"),
            user_agent: "bangcatalog".to_string(),
            compress_playlists: true,
            dont_save_metadata_for_playlists: false,
            initially_unload_playlists: false,
        }
    }
}

/// Forwarded to whoever called [`Session::set_event_sender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Callback(SessionCallback),
    /// An object callback failed for a reason other than a stale handle.
    CallbackFailed(Error),
}

/// Result of one `pump()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pumped {
    /// How long the provider is happy to wait before the next pump.
    pub next_delay: Duration,
    /// Number of callbacks run during this pump.
    pub callbacks: usize,
}

/// The one provider connection, plus the player slot.
///
/// `Session` is neither `Send` nor `Sync`; every entity created from it must
/// stay on the thread that pumps it.
pub struct Session {
    ctx: Context,
    signal: PumpSignal,
    config: SessionConfig,
    has_logged_out: bool,
    player: Loadable<TrackHandle>,
    event_sender: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl Session {
    /// Opens the provider connection. `connect` gets the config and the wake
    /// signal the provider must raise when it has callbacks queued.
    pub fn initialize<P, F>(config: SessionConfig, connect: F) -> Result<Self>
    where
        P: Provider + 'static,
        F: FnOnce(&SessionConfig, PumpSignal) -> ProviderResult<P>,
    {
        if config.application_key.is_empty() {
            return Err(Error::ProviderRejected(ProviderError::InvalidApplicationKey));
        }

        let signal = PumpSignal::new();
        let provider = connect(&config, signal.clone()).map_err(Error::ProviderRejected)?;
        let ctx = Context::new(ProviderRef::new(Box::new(provider)), Dispatcher::new());
        info!(
            user_agent = %config.user_agent,
            cache = %config.cache_location.display(),
            "session initialized"
        );

        Ok(Self {
            player: Loadable::new(&ctx),
            ctx,
            signal,
            config,
            has_logged_out: false,
            event_sender: None,
        })
    }

    pub fn set_event_sender(&mut self, sender: mpsc::UnboundedSender<SessionEvent>) {
        self.event_sender = Some(sender);
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn signal(&self) -> &PumpSignal {
        &self.signal
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.ctx.provider().is_connected()
    }

    pub fn is_pump_requested(&self) -> bool {
        self.signal.is_requested()
    }

    /// Runs every queued provider callback on the calling thread.
    pub fn pump(&mut self) -> Pumped {
        self.signal.clear();
        let Some(batch) = self.ctx.provider().with_mut(|p| p.process_events()) else {
            return Pumped {
                next_delay: IDLE_DELAY,
                callbacks: 0,
            };
        };

        let callbacks = batch.events.len();
        for event in batch.events {
            match event {
                ProviderEvent::Session(callback) => self.on_session_callback(callback),
                ProviderEvent::Object { target, event } => {
                    let delivery = self.ctx.dispatcher().dispatch(target, &event);
                    for failure in delivery.failures {
                        self.report_failure(failure);
                    }
                }
            }
        }

        if callbacks > 0 {
            trace!(callbacks, next_delay_ms = batch.next_timeout.as_millis() as u64, "pumped");
        }
        Pumped {
            next_delay: batch.next_timeout,
            callbacks,
        }
    }

    fn on_session_callback(&mut self, callback: SessionCallback) {
        match &callback {
            SessionCallback::LoggedIn(Ok(())) => info!("logged in"),
            SessionCallback::LoggedIn(Err(err)) => warn!(error = %err, "login failed"),
            SessionCallback::LoggedOut => {
                self.has_logged_out = true;
                info!("logged out");
            }
            SessionCallback::ConnectionError(err) => warn!(error = %err, "connection error"),
            SessionCallback::StreamingError(err) => warn!(error = %err, "streaming error"),
            SessionCallback::LogMessage(message) => {
                info!(target: "provider", "{}", message.trim_end());
            }
            SessionCallback::MessageToUser(message) => info!(%message, "message from provider"),
            SessionCallback::PlayTokenLost => warn!("play token lost to another client"),
            other => debug!(callback = ?other, "session callback"),
        }
        self.emit(SessionEvent::Callback(callback));
    }

    fn report_failure(&mut self, failure: Error) {
        if failure.is_benign() {
            trace!(error = %failure, "ignored stale completion");
            return;
        }
        warn!(error = %failure, "object callback failed");
        self.emit(SessionEvent::CallbackFailed(failure));
    }

    fn emit(&mut self, event: SessionEvent) {
        if let Some(sender) = &self.event_sender {
            if sender.send(event).is_err() {
                debug!("session event receiver dropped");
                self.event_sender = None;
            }
        }
    }

    /// Starts a login; the outcome arrives as a `LoggedIn` callback.
    pub fn login(&mut self, username: &str, password: &str, remember_me: bool) {
        self.has_logged_out = false;
        debug!(%username, remember_me, "login requested");
        self.ctx
            .provider()
            .with_mut(|p| p.login(username, password, remember_me));
    }

    pub fn logout(&mut self) {
        self.ctx.provider().with_mut(|p| p.logout());
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.ctx
            .provider()
            .with(|p| p.connection_state())
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub fn has_logged_out(&self) -> bool {
        self.has_logged_out
    }

    pub fn is_logged_in(&self) -> bool {
        self.is_connected()
            && !self.has_logged_out
            && self.connection_state() == ConnectionState::LoggedIn
    }

    /// Makes `track` the player target. Loading the current target again
    /// does nothing; any other target is unloaded first.
    pub fn load(&mut self, track: &Track) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::Disconnected);
        }
        let handle = track
            .handle()
            .ok_or(Error::Playback(ProviderError::TrackNotPlayable))?;
        if self.player.handle() == Some(handle) {
            return Ok(());
        }

        self.release_player();
        self.ctx
            .provider()
            .with_mut(|p| p.player_load(handle))
            .ok_or(Error::Disconnected)?
            .map_err(Error::Playback)?;
        self.player.load(handle);
        debug!(track = %track.describe(), "player loaded");
        Ok(())
    }

    /// Unloads the player if `track` is its current target.
    pub fn unload(&mut self, track: &Track) {
        if track.handle().is_some() && track.handle() == self.player.handle() {
            self.release_player();
        }
    }

    fn release_player(&mut self) {
        if self.player.handle().is_none() {
            return;
        }
        self.ctx.provider().with_mut(|p| p.player_unload());
        self.player.unload();
    }

    pub fn current_track(&self) -> Option<Track> {
        self.player.handle().map(|h| Track::bound(&self.ctx, h))
    }

    pub fn play(&mut self) {
        if self.player.handle().is_some() {
            self.ctx.provider().with_mut(|p| p.player_play(true));
        }
    }

    pub fn stop(&mut self) {
        if self.player.handle().is_some() {
            self.ctx.provider().with_mut(|p| p.player_play(false));
        }
    }

    pub fn seek(&mut self, offset_ms: u32) {
        if self.player.handle().is_some() {
            self.ctx.provider().with_mut(|p| p.player_seek(offset_ms));
        }
    }

    pub fn prefetch(&mut self, track: &Track) -> Result<()> {
        let Some(handle) = track.handle() else {
            return Ok(());
        };
        self.ctx
            .provider()
            .with_mut(|p| p.player_prefetch(handle))
            .ok_or(Error::Disconnected)?
            .map_err(Error::Playback)
    }

    pub fn set_preferred_bitrate(&mut self, bitrate: Bitrate) {
        self.ctx
            .provider()
            .with_mut(|p| p.set_preferred_bitrate(bitrate));
    }

    /// The logged-in user's playlist container, bound and loading.
    pub fn playlist_container(&mut self) -> Option<PlaylistContainer> {
        let handle = self
            .ctx
            .provider()
            .with_mut(|p| p.session_container())
            .flatten()?;
        Some(PlaylistContainer::bound(&self.ctx, handle))
    }

    pub fn starred_playlist(&mut self) -> Option<Playlist> {
        let handle = self
            .ctx
            .provider()
            .with_mut(|p| p.starred_playlist())
            .flatten()?;
        Some(Playlist::bound(&self.ctx, handle))
    }

    pub fn create_track(&self) -> Track {
        Track::new(&self.ctx)
    }

    pub fn create_album(&self) -> Album {
        Album::new(&self.ctx)
    }

    pub fn create_artist(&self) -> Artist {
        Artist::new(&self.ctx)
    }

    pub fn create_playlist(&self) -> Playlist {
        Playlist::new(&self.ctx)
    }

    pub fn create_container(&self) -> PlaylistContainer {
        PlaylistContainer::new(&self.ctx)
    }

    /// Unloads the player, drains what is left and drops the connection.
    /// Entities that outlive this answer `None` from then on.
    pub fn shutdown(&mut self) {
        if !self.is_connected() {
            return;
        }
        self.release_player();
        self.pump();
        drop(self.ctx.provider().disconnect());
        info!("session shut down");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("connected", &self.is_connected())
            .field("has_logged_out", &self.has_logged_out)
            .field("player", &self.player.handle())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::LoadState;
    use crate::provider::{ObjectEvent, RemoteHandle, SimulatedProvider};
    use crate::testing::{sample_fixture, simulated_session};

    fn session() -> Session {
        simulated_session(sample_fixture()).0
    }

    #[test]
    fn empty_key_is_rejected() {
        let result = Session::initialize(SessionConfig::default(), |_, signal| {
            Ok(SimulatedProvider::new(sample_fixture(), signal))
        });
        assert_eq!(
            result.err(),
            Some(Error::ProviderRejected(ProviderError::InvalidApplicationKey))
        );
    }

    #[test]
    fn connect_failure_is_rejected() {
        let config = SessionConfig {
            application_key: vec![1],
            ..SessionConfig::default()
        };
        let result = Session::initialize(config, |_, _| -> ProviderResult<SimulatedProvider> {
            Err(ProviderError::BadPath {
                path: "/nowhere".into(),
            })
        });
        assert!(matches!(result, Err(Error::ProviderRejected(ProviderError::BadPath { .. }))));
    }

    #[test]
    fn idle_pump_runs_nothing() {
        let mut session = session();
        let pumped = session.pump();
        assert_eq!(pumped.callbacks, 0);
        assert!(!session.is_pump_requested());
    }

    #[test]
    fn login_state_follows_callbacks() {
        let mut session = session();
        assert!(!session.is_logged_in());

        session.login("ana", "hunter2", false);
        session.pump();
        assert!(session.is_logged_in());

        session.logout();
        session.pump();
        assert!(session.has_logged_out());
        assert!(!session.is_logged_in());

        session.login("ana", "hunter2", false);
        assert!(!session.has_logged_out());
    }

    #[test]
    fn session_callbacks_are_forwarded() {
        let mut session = session();
        let (tx, mut rx) = mpsc::unbounded_channel();
        session.set_event_sender(tx);

        session.login("ana", "wrong", false);
        session.pump();
        assert_eq!(
            rx.try_recv().ok(),
            Some(SessionEvent::Callback(SessionCallback::LoggedIn(Err(
                ProviderError::BadCredentials
            ))))
        );
    }

    #[test]
    fn player_slot_swaps_references() {
        let (mut session, probe) = simulated_session(sample_fixture());
        let (t1, t2) = (probe.track("t1").unwrap(), probe.track("t2").unwrap());
        let first = Track::bound(session.context(), t1);
        let second = Track::bound(session.context(), t2);

        session.load(&first).unwrap();
        assert_eq!(probe.ref_count(t1.id()), 2);
        session.load(&first).unwrap();
        assert_eq!(probe.ref_count(t1.id()), 2);

        session.load(&second).unwrap();
        assert_eq!(probe.ref_count(t1.id()), 1);
        assert_eq!(probe.ref_count(t2.id()), 2);
        assert_eq!(probe.player_loaded(), Some(t2));
        assert_eq!(session.current_track().and_then(|t| t.handle()), Some(t2));

        session.unload(&first);
        assert_eq!(probe.player_loaded(), Some(t2));
        session.unload(&second);
        assert_eq!(probe.player_loaded(), None);
        assert_eq!(probe.ref_count(t2.id()), 1);
    }

    #[test]
    fn unplayable_track_is_a_playback_error() {
        let (mut session, probe) = simulated_session(sample_fixture());
        let track = Track::bound(session.context(), probe.track("t3").unwrap());
        assert_eq!(
            session.load(&track),
            Err(Error::Playback(ProviderError::TrackNotPlayable))
        );
        assert!(session.current_track().is_none());
    }

    #[test]
    fn shutdown_turns_entities_into_no_ops() {
        let (mut session, probe) = simulated_session(sample_fixture());
        let t1 = probe.track("t1").unwrap();
        probe.set_loaded(t1.id());
        let track = Track::bound(session.context(), t1);
        session.load(&track).unwrap();

        session.shutdown();
        assert!(!session.is_connected());
        assert_eq!(probe.player_loaded(), None);
        assert_eq!(track.name(), None);
        assert_eq!(session.pump().callbacks, 0);
        assert_eq!(session.load(&track), Err(Error::Disconnected));
        assert_eq!(track.state(), LoadState::Unbound);

        let mut late = Track::new(session.context());
        assert!(!late.load(probe.track("t2").unwrap()));
        assert_eq!(late.handle(), None);
        assert!(!late.is_loading());
        assert_eq!(session.load(&late), Err(Error::Disconnected));
    }

    #[test]
    fn non_stale_failures_become_session_events() {
        let (mut session, probe) = simulated_session(sample_fixture());
        let (tx, mut rx) = mpsc::unbounded_channel();
        session.set_event_sender(tx);
        let t1 = probe.track("t1").unwrap();

        let _guard = session
            .context()
            .dispatcher()
            .subscribe(t1.id(), |_| Err(Error::Disconnected));
        probe.push_event(ProviderEvent::object(t1, ObjectEvent::Loaded));
        session.pump();
        assert_eq!(
            rx.try_recv().ok(),
            Some(SessionEvent::CallbackFailed(Error::Disconnected))
        );
    }
}
