//! Bounded polling

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::{E2eError, E2eResult};

/// Poll `check` every `interval` until it returns `true` or `timeout` lapses.
///
/// The check always runs at least once. Errors from the check are treated as
/// "not yet" (elements detach mid-render) and the last one is reported if the
/// wait times out.
pub async fn poll_until<F, Fut>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut check: F,
) -> E2eResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = E2eResult<bool>>,
{
    let start = Instant::now();
    let mut polls = 0u32;
    let mut last_error: Option<E2eError> = None;

    loop {
        polls += 1;
        match check().await {
            Ok(true) => {
                if polls > 1 {
                    debug!("{} satisfied after {} polls", what, polls);
                }
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => {
                debug!("{}: check failed on poll {}: {}", what, polls, e);
                last_error = Some(e);
            }
        }

        if start.elapsed() >= timeout {
            let reason = match last_error {
                Some(e) => format!("{} after {:?} (last error: {})", what, timeout, e),
                None => format!("{} after {:?}", what, timeout),
            };
            return Err(E2eError::Timeout(reason));
        }

        sleep(interval).await;
    }
}
