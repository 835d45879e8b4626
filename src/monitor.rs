//! Periodic pollers.
//!
//! Two independent timer-driven tasks share the instrument gate with the
//! on-demand writers: a fast measurement poller and a slower regulation
//! mode poller. Each tick runs one cycle as a single gate transaction, so
//! a writer arriving mid-cycle waits for the whole cycle to finish.
//!
//! A cycle that outruns its interval must not pile up behind itself. The
//! loop body awaits each cycle, which makes overlapping cycles structurally
//! impossible, and the ticker uses [`MissedTickBehavior::Skip`] so ticks
//! that fired during a slow cycle are dropped rather than queued. Skipped
//! ticks are logged.

use crate::dp832::Dp832;
use crate::events::{EventBus, SupplyEvent};
use crate::link::InstrumentLink;
use crate::snapshot::SupplySnapshot;
use crate::types::Channel;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, warn};

fn make_ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

fn warn_if_ticks_skipped(label: &str, period: Duration, previous: Option<Instant>, tick: Instant) {
    if let Some(previous) = previous {
        let behind = tick.duration_since(previous);
        if behind > period + period / 2 {
            warn!(
                poller = label,
                ?behind,
                "cycle overran its interval; skipped tick(s)"
            );
        }
    }
}

/// Spawn the measurement poller.
///
/// Once per interval: query voltage/current/power for every channel in one
/// locked transaction, store all channels plus the elapsed-time stamp
/// atomically, publish exactly one [`SupplyEvent::ValuesUpdated`]. A failed
/// query aborts the cycle without publishing; the next tick proceeds
/// normally.
pub fn spawn_measurement_poller<L: InstrumentLink + 'static>(
    supply: Arc<Dp832<L>>,
    snapshot: SupplySnapshot,
    events: EventBus,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = make_ticker(period);
        let mut last_tick = None;
        loop {
            let tick = ticker.tick().await;
            warn_if_ticks_skipped("measurement", period, last_tick, tick);
            last_tick = Some(tick);

            match supply.measure_all_channels().await {
                Ok(readings) => {
                    snapshot.apply_measurements(&readings);
                    events.publish(SupplyEvent::ValuesUpdated);
                }
                Err(error) => warn!(%error, "measurement cycle aborted"),
            }
        }
    })
}

/// Spawn the regulation mode poller.
///
/// Once per interval: read every channel's mode in one locked transaction,
/// then publish one [`SupplyEvent::ModeChanged`] per channel whose mode
/// differs from the stored value. Unchanged reads publish nothing. A failed
/// cycle applies no updates.
pub fn spawn_mode_poller<L: InstrumentLink + 'static>(
    supply: Arc<Dp832<L>>,
    snapshot: SupplySnapshot,
    events: EventBus,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = make_ticker(period);
        let mut last_tick = None;
        loop {
            let tick = ticker.tick().await;
            warn_if_ticks_skipped("mode", period, last_tick, tick);
            last_tick = Some(tick);

            match supply.read_all_modes().await {
                Ok(modes) => {
                    for channel in Channel::ALL {
                        let mode = modes[channel.index()];
                        if snapshot.mode(channel) != mode {
                            snapshot.apply_mode(channel, mode);
                            debug!(%channel, %mode, "regulation mode changed");
                            events.publish(SupplyEvent::ModeChanged(channel));
                        }
                    }
                }
                Err(error) => warn!(%error, "mode poll cycle aborted"),
            }
        }
    })
}
