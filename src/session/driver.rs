use std::time::Duration;

use tokio::time::sleep;
use tracing::trace;

use super::Session;
use crate::error::{Error, Result};

/// Pumps `session` until `done` holds, sleeping between pumps for whichever
/// is shorter: the provider's requested delay or `max_delay`. A wake request
/// from the provider cuts the sleep short.
///
/// The future borrows the session mutably and is not `Send`; run it on a
/// current-thread runtime or a `LocalSet`. Returns the number of pumps.
pub async fn drive_until<F>(session: &mut Session, mut done: F, max_delay: Duration) -> Result<usize>
where
    F: FnMut(&Session) -> bool,
{
    let signal = session.signal().clone();
    let mut pumps = 0;
    loop {
        if !session.is_connected() {
            return Err(Error::Disconnected);
        }
        let pumped = session.pump();
        pumps += 1;
        if done(session) {
            return Ok(pumps);
        }

        let delay = pumped.next_delay.min(max_delay);
        tokio::select! {
            _ = sleep(delay) => {}
            _ = signal.notified() => trace!(pumps, "woken by provider"),
        }
    }
}
