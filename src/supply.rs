//! Power supply session facade.
//!
//! [`PowerSupply`] owns the command gateway, the shared snapshot, the event
//! bus and the two poller tasks. External callers (the UI layer) go through
//! it for every on-demand read or write; those calls contend for the same
//! instrument gate as the pollers, so nothing ever interleaves on the link.

use crate::config::Settings;
use crate::dp832::Dp832;
use crate::error::PsuResult;
use crate::events::{EventBus, SupplyEvent};
use crate::link::InstrumentLink;
use crate::monitor;
use crate::snapshot::SupplySnapshot;
use crate::types::{Channel, OutputState, ProtectionKind, ProtectionState, SetpointKind};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

/// Capacity of the event broadcast channel. Slow subscribers start lagging
/// after this many undelivered events.
const EVENT_CAPACITY: usize = 64;

/// A live session with the instrument.
pub struct PowerSupply<L: InstrumentLink> {
    device: Arc<Dp832<L>>,
    snapshot: SupplySnapshot,
    events: EventBus,
    status_log: Mutex<Vec<String>>,
    pollers: Vec<JoinHandle<()>>,
}

impl<L: InstrumentLink + 'static> PowerSupply<L> {
    /// Start a session: seed the snapshot with the programmed set-points,
    /// then spawn both pollers.
    ///
    /// Fails if the initial set-point read fails; an instrument that cannot
    /// answer at session start is not worth polling.
    pub async fn start(link: L, settings: &Settings) -> PsuResult<Self> {
        let device = Arc::new(Dp832::new(link, settings.instrument.settle_time));
        let snapshot = SupplySnapshot::new();

        let setpoints = device.read_all_setpoints().await?;
        for channel in Channel::ALL {
            let (voltage, current) = setpoints[channel.index()];
            snapshot.record_setpoint(SetpointKind::Voltage, channel, voltage);
            snapshot.record_setpoint(SetpointKind::Current, channel, current);
        }

        let events = EventBus::new(EVENT_CAPACITY);
        let pollers = vec![
            monitor::spawn_measurement_poller(
                device.clone(),
                snapshot.clone(),
                events.clone(),
                settings.polling.measure_interval,
            ),
            monitor::spawn_mode_poller(
                device.clone(),
                snapshot.clone(),
                events.clone(),
                settings.polling.mode_interval,
            ),
        ];
        info!(
            measure_interval = ?settings.polling.measure_interval,
            mode_interval = ?settings.polling.mode_interval,
            "power supply session started"
        );

        Ok(Self {
            device,
            snapshot,
            events,
            status_log: Mutex::new(Vec::new()),
            pollers,
        })
    }

    /// Handle to the shared snapshot.
    pub fn snapshot(&self) -> SupplySnapshot {
        self.snapshot.clone()
    }

    /// Subscribe to poller notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SupplyEvent> {
        self.events.subscribe()
    }

    /// Enable or disable a channel's output.
    pub async fn set_output(&self, channel: Channel, on: bool) -> PsuResult<()> {
        self.device.set_output(channel, on).await
    }

    /// Arm or disarm a protection circuit.
    pub async fn set_protection(
        &self,
        kind: ProtectionKind,
        channel: Channel,
        on: bool,
    ) -> PsuResult<()> {
        self.device.set_protection(kind, channel, on).await
    }

    /// Program a voltage or current set-point and record it in the
    /// snapshot once the instrument accepted it.
    pub async fn set_setpoint(
        &self,
        kind: SetpointKind,
        channel: Channel,
        value: f64,
    ) -> PsuResult<()> {
        self.device.set_setpoint(kind, channel, value).await?;
        self.snapshot.record_setpoint(kind, channel, value);
        Ok(())
    }

    /// Program a protection trip limit.
    pub async fn set_protection_limit(
        &self,
        kind: ProtectionKind,
        channel: Channel,
        value: f64,
    ) -> PsuResult<()> {
        self.device.set_protection_limit(kind, channel, value).await
    }

    /// Read whether a channel's output is enabled.
    pub async fn read_output_state(&self, channel: Channel) -> PsuResult<OutputState> {
        self.device.read_output_state(channel).await
    }

    /// Read whether a protection circuit is armed.
    pub async fn read_protection_state(
        &self,
        kind: ProtectionKind,
        channel: Channel,
    ) -> PsuResult<ProtectionState> {
        self.device.read_protection_state(kind, channel).await
    }

    /// Read a protection trip limit.
    pub async fn read_protection_limit(
        &self,
        kind: ProtectionKind,
        channel: Channel,
    ) -> PsuResult<f64> {
        self.device.read_protection_limit(kind, channel).await
    }

    /// Read a programmed set-point from the instrument.
    pub async fn read_setpoint(&self, kind: SetpointKind, channel: Channel) -> PsuResult<f64> {
        self.device.read_setpoint(kind, channel).await
    }

    /// Query a channel's output state and append a wall-clock-stamped line
    /// to the in-memory status log.
    pub async fn record_output_status(&self, channel: Channel) -> PsuResult<()> {
        let state = self.device.read_output_state(channel).await?;
        let stamp = chrono::Local::now().format("%H:%M:%S");
        self.status_log.lock().push(format!(
            "[{}] Channel {} status: {}",
            stamp,
            channel.number(),
            state
        ));
        Ok(())
    }

    /// Copy of the recorded status lines.
    pub fn output_status_log(&self) -> Vec<String> {
        self.status_log.lock().clone()
    }

    /// Stop both pollers and end the session. In-flight transactions finish
    /// at their next await point; the instrument itself is left as-is.
    pub async fn shutdown(self) {
        for task in self.pollers {
            task.abort();
            let _ = task.await;
        }
        info!("power supply session stopped");
    }
}
