//! Exclusive access gate for the instrument link.
//!
//! The power supply processes one command at a time, so every piece of
//! instrument traffic in the application funnels through one
//! [`InstrumentGate`]. A logical transaction (one writer call, or one whole
//! poll cycle across all channels) acquires the gate once, performs its
//! exchanges, and releases it when the [`Transaction`] guard drops. That
//! makes lock release on error paths structural rather than a matter of
//! discipline.
//!
//! The settle delay the instrument needs after applying a command is spent
//! *inside* the transaction, while the lock is still held; releasing first
//! would let another transaction reach the instrument before it is ready.
//!
//! The gate is not re-entrant. Code holding a [`Transaction`] must not call
//! back into anything that begins another one; there is exactly one gate
//! acquisition per logical transaction.

use crate::error::PsuResult;
use crate::link::InstrumentLink;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::trace;

/// Serializes all traffic to the instrument link.
pub struct InstrumentGate<L> {
    link: Mutex<L>,
    settle_time: Duration,
}

impl<L: InstrumentLink> InstrumentGate<L> {
    /// Wrap a link. `settle_time` is slept inside the lock after settled
    /// sends.
    pub fn new(link: L, settle_time: Duration) -> Self {
        Self {
            link: Mutex::new(link),
            settle_time,
        }
    }

    /// Acquire exclusive access to the link, waiting for the current holder
    /// (including its settle delay) to finish.
    pub async fn begin(&self) -> Transaction<'_, L> {
        Transaction {
            link: self.link.lock().await,
            settle_time: self.settle_time,
        }
    }
}

/// Exclusive critical section on the instrument link.
///
/// Dropping the transaction releases the gate on every exit path.
pub struct Transaction<'a, L: InstrumentLink> {
    link: MutexGuard<'a, L>,
    settle_time: Duration,
}

impl<L: InstrumentLink> Transaction<'_, L> {
    /// Issue a command with no response and no settle delay.
    pub async fn send(&mut self, command: &str) -> PsuResult<()> {
        trace!(command, "send");
        self.link.send(command).await
    }

    /// Issue a command and wait out the instrument's settle time before the
    /// lock is released.
    pub async fn send_settled(&mut self, command: &str) -> PsuResult<()> {
        self.send(command).await?;
        if !self.settle_time.is_zero() {
            tokio::time::sleep(self.settle_time).await;
        }
        Ok(())
    }

    /// Issue a query and return its response.
    pub async fn query(&mut self, command: &str) -> PsuResult<String> {
        trace!(command, "query");
        self.link.query(command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::mock::scripted_link;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_settle_delay_is_spent_inside_the_lock() {
        let (link, handle) = scripted_link();
        let gate = Arc::new(InstrumentGate::new(link, Duration::from_secs(1)));

        let first = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let mut txn = gate.begin().await;
                txn.send_settled("OUTP CH1,ON").await.unwrap();
            })
        };
        // Let the first transaction take the gate before contending.
        tokio::time::sleep(Duration::from_millis(1)).await;

        let second = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let mut txn = gate.begin().await;
                txn.send("OUTP CH2,ON").await.unwrap();
            })
        };

        first.await.unwrap();
        second.await.unwrap();

        let log = handle.exchanges();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].command, "OUTP CH1,ON");
        assert_eq!(log[1].command, "OUTP CH2,ON");
        // The second transaction could not start until the first one's
        // settle delay had elapsed.
        assert!(log[1].entered >= log[0].entered + Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_lock_released_after_failed_transaction() {
        let (link, handle) = scripted_link();
        handle.set_response("OUTP? CH1", "ON");
        let gate = InstrumentGate::new(link, Duration::ZERO);

        handle.fail_next();
        {
            let mut txn = gate.begin().await;
            assert!(txn.query("OUTP? CH1").await.is_err());
        }

        // A failed transaction must not wedge the gate.
        let mut txn = gate.begin().await;
        assert_eq!(txn.query("OUTP? CH1").await.unwrap(), "ON");
    }
}
