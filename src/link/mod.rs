//! Instrument link abstractions.
//!
//! The link is the lowest layer the core talks to: a command/response
//! primitive over whatever physically carries the bytes. Everything above it
//! (the access gate, the typed command layer, the pollers) is written
//! against the [`InstrumentLink`] trait so tests can substitute a scripted
//! mock for real hardware.

use crate::error::{PsuError, PsuResult};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

pub mod mock;
#[cfg(feature = "instrument_serial")]
pub mod serial;

/// Command/response primitive over the physical instrument link.
///
/// Implementations are not required to be thread-safe; exclusive access is
/// the job of the [`InstrumentGate`](crate::gate::InstrumentGate) that owns
/// the link. Both operations cover exactly one wire exchange.
#[async_trait]
pub trait InstrumentLink: Send {
    /// Send a command that produces no response.
    async fn send(&mut self, command: &str) -> PsuResult<()>;

    /// Send a query and read back one response.
    async fn query(&mut self, command: &str) -> PsuResult<String>;
}

/// Open a link with a bounded retry loop and fixed backoff.
///
/// `open` is attempted repeatedly until it succeeds or `timeout` has
/// elapsed; failed attempts wait `retry_delay` before trying again. After
/// the deadline the last failure is reported as [`PsuError::Connection`],
/// which is fatal to session start.
pub async fn connect_with_retry<L, F, Fut>(
    mut open: F,
    timeout: Duration,
    retry_delay: Duration,
) -> PsuResult<L>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PsuResult<L>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match open().await {
            Ok(link) => return Ok(link),
            Err(error) => {
                if tokio::time::Instant::now() + retry_delay >= deadline {
                    return Err(PsuError::Connection(format!(
                        "no connection within {:?}: {}",
                        timeout, error
                    )));
                }
                warn!(%error, retry_in = ?retry_delay, "connection attempt failed");
                tokio::time::sleep(retry_delay).await;
            }
        }
    }
}
