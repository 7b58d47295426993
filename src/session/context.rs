use super::dispatch::Dispatcher;
use crate::provider::ProviderRef;

/// What every entity and tree needs from the session: a view of the provider
/// connection and a place to register completion callbacks.
#[derive(Debug, Clone)]
pub struct Context {
    provider: ProviderRef,
    dispatcher: Dispatcher,
}

impl Context {
    pub(crate) fn new(provider: ProviderRef, dispatcher: Dispatcher) -> Self {
        Self {
            provider,
            dispatcher,
        }
    }

    pub fn provider(&self) -> &ProviderRef {
        &self.provider
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}
