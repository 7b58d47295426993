// Shared fixtures for unit tests

use crate::provider::{CatalogFixture, CatalogProbe, ProviderRef, SimulatedProvider};
use crate::session::{Context, Dispatcher, PumpSignal, Session, SessionConfig};

pub(crate) fn sample_fixture() -> CatalogFixture {
    CatalogFixture::from_toml(include_str!("../demos/catalog.toml")).expect("sample catalog parses")
}

/// A provider and dispatcher wired together without a session around them.
pub(crate) fn simulated_context(fixture: CatalogFixture) -> (Context, CatalogProbe) {
    let provider = SimulatedProvider::new(fixture, PumpSignal::new());
    let probe = provider.probe();
    let ctx = Context::new(ProviderRef::new(Box::new(provider)), Dispatcher::new());
    (ctx, probe)
}

pub(crate) fn simulated_session(fixture: CatalogFixture) -> (Session, CatalogProbe) {
    let config = SessionConfig {
        application_key: b"test-key".to_vec(),
        ..SessionConfig::default()
    };
    let mut probe = None;
    let session = Session::initialize(config, |_, signal| {
        let provider = SimulatedProvider::new(fixture, signal);
        probe = Some(provider.probe());
        Ok(provider)
    })
    .expect("simulated session starts");
    (session, probe.expect("connect ran"))
}
