//! Shared snapshot of last-known instrument state.
//!
//! The snapshot is the one record the UI layer reads: per-channel measured
//! values, regulation mode, programmed set-points, and the elapsed session
//! time. Writers are the pollers (and, for set-point records, successful
//! writer calls); readers always receive copies taken under the same lock a
//! multi-field update holds, so a half-applied measurement cycle is never
//! observable.

use crate::types::{Channel, Measurement, RegulationMode, SetpointKind};
use parking_lot::RwLock;
use std::sync::Arc;

/// Elapsed-time resolution: 5 decimal places (10 µs).
fn round_elapsed(seconds: f64) -> f64 {
    (seconds * 1e5).round() / 1e5
}

/// Last-known state of one output channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelState {
    /// Most recent measured values, all three from the same query.
    pub measurement: Measurement,
    /// Mode from the last successfully completed mode cycle.
    pub mode: RegulationMode,
    /// Programmed voltage set-point as last read or written.
    pub voltage_setpoint: f64,
    /// Programmed current set-point as last read or written.
    pub current_setpoint: f64,
}

struct Inner {
    channels: [ChannelState; Channel::COUNT],
    elapsed_seconds: f64,
}

/// Cloneable handle to the shared device state.
///
/// Clones share storage; the session start instant is fixed at creation.
#[derive(Clone)]
pub struct SupplySnapshot {
    inner: Arc<RwLock<Inner>>,
    started: tokio::time::Instant,
}

impl SupplySnapshot {
    /// Create an empty snapshot; all channels read zero and unregulated
    /// until the first poll cycle lands.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                channels: [ChannelState::default(); Channel::COUNT],
                elapsed_seconds: 0.0,
            })),
            started: tokio::time::Instant::now(),
        }
    }

    /// Copy of one channel's state.
    pub fn channel(&self, channel: Channel) -> ChannelState {
        self.inner.read().channels[channel.index()]
    }

    /// Seconds since session start at the last completed measurement cycle,
    /// rounded to 10 µs.
    pub fn elapsed_seconds(&self) -> f64 {
        self.inner.read().elapsed_seconds
    }

    /// Stored regulation mode for one channel.
    pub fn mode(&self, channel: Channel) -> RegulationMode {
        self.inner.read().channels[channel.index()].mode
    }

    /// Stored set-point for one channel.
    pub fn setpoint(&self, kind: SetpointKind, channel: Channel) -> f64 {
        let state = self.channel(channel);
        match kind {
            SetpointKind::Voltage => state.voltage_setpoint,
            SetpointKind::Current => state.current_setpoint,
        }
    }

    /// Apply one completed measurement cycle: every channel's reading plus
    /// the elapsed-time stamp, under a single write lock.
    pub(crate) fn apply_measurements(&self, readings: &[Measurement; Channel::COUNT]) {
        let elapsed = round_elapsed(self.started.elapsed().as_secs_f64());
        let mut inner = self.inner.write();
        for channel in Channel::ALL {
            inner.channels[channel.index()].measurement = readings[channel.index()];
        }
        inner.elapsed_seconds = elapsed;
    }

    /// Store a newly observed regulation mode for one channel.
    pub(crate) fn apply_mode(&self, channel: Channel, mode: RegulationMode) {
        self.inner.write().channels[channel.index()].mode = mode;
    }

    /// Record a programmed set-point (initial read or successful write).
    pub(crate) fn record_setpoint(&self, kind: SetpointKind, channel: Channel, value: f64) {
        let mut inner = self.inner.write();
        let state = &mut inner.channels[channel.index()];
        match kind {
            SetpointKind::Voltage => state.voltage_setpoint = value,
            SetpointKind::Current => state.current_setpoint = value,
        }
    }
}

impl Default for SupplySnapshot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_elapsed() {
        assert_eq!(round_elapsed(1.234_567_89), 1.234_57);
        assert_eq!(round_elapsed(0.0), 0.0);
        assert_eq!(round_elapsed(0.3), 0.3);
        // 10 µs resolution means the fifth decimal survives, the sixth does
        // not.
        assert_eq!(round_elapsed(2.000_004), 2.0);
        assert_eq!(round_elapsed(2.000_06), 2.000_06);
    }

    #[tokio::test]
    async fn test_apply_measurements_is_batched() {
        let snapshot = SupplySnapshot::new();
        let readings = [
            Measurement {
                voltage: 12.0,
                current: 0.5,
                power: 6.0,
            },
            Measurement {
                voltage: 5.0,
                current: 1.0,
                power: 5.0,
            },
            Measurement::default(),
        ];
        snapshot.apply_measurements(&readings);

        assert_eq!(snapshot.channel(Channel::Ch1).measurement, readings[0]);
        assert_eq!(snapshot.channel(Channel::Ch2).measurement, readings[1]);
        assert_eq!(snapshot.channel(Channel::Ch3).measurement, readings[2]);
    }

    #[tokio::test]
    async fn test_modes_and_setpoints() {
        let snapshot = SupplySnapshot::new();
        assert_eq!(snapshot.mode(Channel::Ch1), RegulationMode::Unregulated);

        snapshot.apply_mode(Channel::Ch1, RegulationMode::ConstantCurrent);
        assert_eq!(snapshot.mode(Channel::Ch1), RegulationMode::ConstantCurrent);
        assert_eq!(snapshot.mode(Channel::Ch2), RegulationMode::Unregulated);

        snapshot.record_setpoint(SetpointKind::Voltage, Channel::Ch2, 12.0);
        snapshot.record_setpoint(SetpointKind::Current, Channel::Ch2, 1.5);
        assert_eq!(snapshot.setpoint(SetpointKind::Voltage, Channel::Ch2), 12.0);
        assert_eq!(snapshot.setpoint(SetpointKind::Current, Channel::Ch2), 1.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_tracks_the_clock() {
        let snapshot = SupplySnapshot::new();
        let readings = [Measurement::default(); Channel::COUNT];

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        snapshot.apply_measurements(&readings);
        assert!((snapshot.elapsed_seconds() - 0.3).abs() < 1e-9);

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        snapshot.apply_measurements(&readings);
        assert!((snapshot.elapsed_seconds() - 0.6).abs() < 1e-9);
    }
}
