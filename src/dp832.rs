//! Rigol DP832/DP832A command gateway.
//!
//! Typed operations over the instrument's SCPI vocabulary. Every public
//! method is exactly one gate transaction: poll cycles hold the gate across
//! all channels, writers hold it for a single command plus the settle
//! delay, readers for a single query. Range checking happens *before* a
//! transaction is begun, so a rejected set-point never generates traffic.

use crate::error::{PsuError, PsuResult};
use crate::gate::InstrumentGate;
use crate::link::InstrumentLink;
use crate::types::{
    Channel, Measurement, OutputState, ProtectionKind, ProtectionState, RegulationMode,
    SetpointKind,
};
use std::time::Duration;
use tracing::instrument;

/// Minimum programmable output voltage in volts.
pub const VOLTAGE_MIN: f64 = 0.0;
/// Maximum programmable output voltage in volts for channels 1 and 2.
pub const VOLTAGE_MAX: f64 = 30.0;
/// Maximum programmable output voltage in volts for channel 3.
pub const VOLTAGE_MAX_CH3: f64 = 5.0;
/// Minimum programmable output current in amperes.
pub const CURRENT_MIN: f64 = 0.0;
/// Maximum programmable output current in amperes.
pub const CURRENT_MAX: f64 = 3.0;

/// Inclusive programmable range for a set-point kind on a channel.
pub fn setpoint_range(kind: SetpointKind, channel: Channel) -> (f64, f64) {
    match kind {
        SetpointKind::Voltage if channel == Channel::Ch3 => (VOLTAGE_MIN, VOLTAGE_MAX_CH3),
        SetpointKind::Voltage => (VOLTAGE_MIN, VOLTAGE_MAX),
        SetpointKind::Current => (CURRENT_MIN, CURRENT_MAX),
    }
}

fn check_range(kind: SetpointKind, channel: Channel, value: f64) -> PsuResult<()> {
    let (min, max) = setpoint_range(kind, channel);
    if value < min || value > max {
        return Err(PsuError::Range {
            quantity: match kind {
                SetpointKind::Voltage => "voltage",
                SetpointKind::Current => "current",
            },
            channel,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Protection limits share the set-point bounds for the same quantity.
fn protection_quantity(kind: ProtectionKind) -> SetpointKind {
    match kind {
        ProtectionKind::OverVoltage => SetpointKind::Voltage,
        ProtectionKind::OverCurrent => SetpointKind::Current,
    }
}

/// Typed command gateway to a DP832.
pub struct Dp832<L> {
    gate: InstrumentGate<L>,
}

impl<L: InstrumentLink> Dp832<L> {
    /// Wrap a link. `settle_time` is the fixed delay the instrument needs
    /// after a write, spent inside the access lock.
    pub fn new(link: L, settle_time: Duration) -> Self {
        Self {
            gate: InstrumentGate::new(link, settle_time),
        }
    }

    /// One measurement cycle: voltage/current/power for every channel in
    /// ascending order, under a single gate acquisition. Fails fast; a
    /// query error on one channel aborts the remaining channels.
    pub async fn measure_all_channels(&self) -> PsuResult<[Measurement; Channel::COUNT]> {
        let mut txn = self.gate.begin().await;
        let mut readings = [Measurement::default(); Channel::COUNT];
        for channel in Channel::ALL {
            let response = txn.query(&scpi::measure_all(channel)).await?;
            readings[channel.index()] = Measurement::parse(&response)?;
        }
        Ok(readings)
    }

    /// One mode cycle: regulation mode for every channel in ascending
    /// order, under a single gate acquisition.
    pub async fn read_all_modes(&self) -> PsuResult<[RegulationMode; Channel::COUNT]> {
        let mut txn = self.gate.begin().await;
        let mut modes = [RegulationMode::default(); Channel::COUNT];
        for channel in Channel::ALL {
            let response = txn.query(&scpi::output_mode(channel)).await?;
            modes[channel.index()] = RegulationMode::from_response(&response);
        }
        Ok(modes)
    }

    /// Read every channel's programmed (voltage, current) set-points in one
    /// gate acquisition. Used to seed the snapshot at session start.
    pub async fn read_all_setpoints(&self) -> PsuResult<[(f64, f64); Channel::COUNT]> {
        let mut txn = self.gate.begin().await;
        let mut setpoints = [(0.0, 0.0); Channel::COUNT];
        for channel in Channel::ALL {
            let response = txn.query(&scpi::applied_values(channel)).await?;
            setpoints[channel.index()] = (
                scpi::parse_applied(&response, SetpointKind::Voltage)?,
                scpi::parse_applied(&response, SetpointKind::Current)?,
            );
        }
        Ok(setpoints)
    }

    /// Enable or disable a channel's output.
    #[instrument(skip(self), err)]
    pub async fn set_output(&self, channel: Channel, on: bool) -> PsuResult<()> {
        let mut txn = self.gate.begin().await;
        txn.send_settled(&scpi::output_switch(channel, on)).await
    }

    /// Arm or disarm over-voltage/over-current protection on a channel.
    #[instrument(skip(self), err)]
    pub async fn set_protection(
        &self,
        kind: ProtectionKind,
        channel: Channel,
        on: bool,
    ) -> PsuResult<()> {
        let mut txn = self.gate.begin().await;
        txn.send_settled(&scpi::protection_switch(kind, channel, on))
            .await
    }

    /// Program a voltage or current set-point. The value is range-checked
    /// against the channel's limits before any instrument traffic.
    #[instrument(skip(self), err)]
    pub async fn set_setpoint(
        &self,
        kind: SetpointKind,
        channel: Channel,
        value: f64,
    ) -> PsuResult<()> {
        check_range(kind, channel, value)?;
        let mut txn = self.gate.begin().await;
        txn.send(&scpi::select_channel(channel)).await?;
        txn.send_settled(&scpi::setpoint(kind, value)).await
    }

    /// Program a protection trip limit, range-checked like the matching
    /// set-point.
    #[instrument(skip(self), err)]
    pub async fn set_protection_limit(
        &self,
        kind: ProtectionKind,
        channel: Channel,
        value: f64,
    ) -> PsuResult<()> {
        check_range(protection_quantity(kind), channel, value)?;
        let mut txn = self.gate.begin().await;
        txn.send_settled(&scpi::protection_limit_set(kind, channel, value))
            .await
    }

    /// Read whether a channel's output is enabled.
    pub async fn read_output_state(&self, channel: Channel) -> PsuResult<OutputState> {
        let mut txn = self.gate.begin().await;
        let response = txn.query(&scpi::output_state(channel)).await?;
        Ok(OutputState::from_response(&response))
    }

    /// Read whether a protection circuit is armed.
    pub async fn read_protection_state(
        &self,
        kind: ProtectionKind,
        channel: Channel,
    ) -> PsuResult<ProtectionState> {
        let mut txn = self.gate.begin().await;
        let response = txn.query(&scpi::protection_state(kind, channel)).await?;
        Ok(ProtectionState::from_response(&response))
    }

    /// Read a protection trip limit.
    pub async fn read_protection_limit(
        &self,
        kind: ProtectionKind,
        channel: Channel,
    ) -> PsuResult<f64> {
        let mut txn = self.gate.begin().await;
        let response = txn.query(&scpi::protection_limit(kind, channel)).await?;
        scpi::parse_f64(&response)
    }

    /// Read a programmed set-point.
    pub async fn read_setpoint(&self, kind: SetpointKind, channel: Channel) -> PsuResult<f64> {
        let mut txn = self.gate.begin().await;
        let response = txn.query(&scpi::applied_values(channel)).await?;
        scpi::parse_applied(&response, kind)
    }
}

/// SCPI command strings and response parsing for the DP832.
///
/// Pure functions, one per command in the instrument's vocabulary.
pub mod scpi {
    use super::*;

    fn switch(on: bool) -> &'static str {
        if on {
            "ON"
        } else {
            "OFF"
        }
    }

    fn protection_stem(kind: ProtectionKind) -> &'static str {
        match kind {
            ProtectionKind::OverVoltage => "OVP",
            ProtectionKind::OverCurrent => "OCP",
        }
    }

    /// `INST:SELE CHn`
    pub fn select_channel(channel: Channel) -> String {
        format!("INST:SELE CH{}", channel.number())
    }

    /// `:VOLT v` / `:CURR v` for the currently selected channel.
    pub fn setpoint(kind: SetpointKind, value: f64) -> String {
        match kind {
            SetpointKind::Voltage => format!(":VOLT {}", value),
            SetpointKind::Current => format!(":CURR {}", value),
        }
    }

    /// `MEAS:ALL? CHn`
    pub fn measure_all(channel: Channel) -> String {
        format!("MEAS:ALL? CH{}", channel.number())
    }

    /// `APPL? CHn`
    pub fn applied_values(channel: Channel) -> String {
        format!("APPL? CH{}", channel.number())
    }

    /// `OUTP CHn,ON|OFF`
    pub fn output_switch(channel: Channel, on: bool) -> String {
        format!("OUTP CH{},{}", channel.number(), switch(on))
    }

    /// `OUTP:OVP CHn,ON|OFF` / `OUTP:OCP CHn,ON|OFF`
    pub fn protection_switch(kind: ProtectionKind, channel: Channel, on: bool) -> String {
        format!(
            "OUTP:{} CH{},{}",
            protection_stem(kind),
            channel.number(),
            switch(on)
        )
    }

    /// `OUTP:OVP:VAL CHn,v` / `OUTP:OCP:VAL CHn,v`
    pub fn protection_limit_set(kind: ProtectionKind, channel: Channel, value: f64) -> String {
        format!(
            "OUTP:{}:VAL CH{},{}",
            protection_stem(kind),
            channel.number(),
            value
        )
    }

    /// `OUTP? CHn`
    pub fn output_state(channel: Channel) -> String {
        format!("OUTP? CH{}", channel.number())
    }

    /// `OUTP:OVP? CHn` / `OUTP:OCP? CHn`
    pub fn protection_state(kind: ProtectionKind, channel: Channel) -> String {
        format!("OUTP:{}? CH{}", protection_stem(kind), channel.number())
    }

    /// `OUTP:OVP:VAL? CHn` / `OUTP:OCP:VAL? CHn`
    pub fn protection_limit(kind: ProtectionKind, channel: Channel) -> String {
        format!("OUTP:{}:VAL? CH{}", protection_stem(kind), channel.number())
    }

    /// `:OUTP:MODE? CHn`
    pub fn output_mode(channel: Channel) -> String {
        format!(":OUTP:MODE? CH{}", channel.number())
    }

    /// Parse a bare numeric response.
    pub fn parse_f64(response: &str) -> PsuResult<f64> {
        response
            .trim()
            .parse::<f64>()
            .map_err(|_| PsuError::UnknownResponse(response.trim().to_string()))
    }

    /// Pull one set-point out of an `APPL?` response. The instrument
    /// answers `CHn:30V/3A,<voltage>,<current>`.
    pub fn parse_applied(response: &str, kind: SetpointKind) -> PsuResult<f64> {
        let field = match kind {
            SetpointKind::Voltage => 1,
            SetpointKind::Current => 2,
        };
        response
            .trim()
            .split(',')
            .nth(field)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .ok_or_else(|| PsuError::UnknownResponse(response.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::mock::scripted_link;

    #[test]
    fn test_command_strings() {
        assert_eq!(scpi::select_channel(Channel::Ch2), "INST:SELE CH2");
        assert_eq!(scpi::setpoint(SetpointKind::Voltage, 12.5), ":VOLT 12.5");
        assert_eq!(scpi::setpoint(SetpointKind::Current, 0.25), ":CURR 0.25");
        assert_eq!(scpi::measure_all(Channel::Ch1), "MEAS:ALL? CH1");
        assert_eq!(scpi::applied_values(Channel::Ch3), "APPL? CH3");
        assert_eq!(scpi::output_switch(Channel::Ch1, true), "OUTP CH1,ON");
        assert_eq!(scpi::output_switch(Channel::Ch1, false), "OUTP CH1,OFF");
        assert_eq!(
            scpi::protection_switch(ProtectionKind::OverVoltage, Channel::Ch2, true),
            "OUTP:OVP CH2,ON"
        );
        assert_eq!(
            scpi::protection_limit_set(ProtectionKind::OverCurrent, Channel::Ch1, 1.5),
            "OUTP:OCP:VAL CH1,1.5"
        );
        assert_eq!(scpi::output_state(Channel::Ch1), "OUTP? CH1");
        assert_eq!(
            scpi::protection_state(ProtectionKind::OverCurrent, Channel::Ch3),
            "OUTP:OCP? CH3"
        );
        assert_eq!(
            scpi::protection_limit(ProtectionKind::OverVoltage, Channel::Ch1),
            "OUTP:OVP:VAL? CH1"
        );
        assert_eq!(scpi::output_mode(Channel::Ch2), ":OUTP:MODE? CH2");
    }

    #[test]
    fn test_parse_applied() {
        let response = "CH1:30V/3A,5.000,1.0000";
        assert_eq!(
            scpi::parse_applied(response, SetpointKind::Voltage).unwrap(),
            5.0
        );
        assert_eq!(
            scpi::parse_applied(response, SetpointKind::Current).unwrap(),
            1.0
        );
        assert!(scpi::parse_applied("CH1:30V/3A", SetpointKind::Voltage).is_err());
    }

    #[test]
    fn test_setpoint_ranges() {
        assert_eq!(
            setpoint_range(SetpointKind::Voltage, Channel::Ch1),
            (0.0, 30.0)
        );
        assert_eq!(
            setpoint_range(SetpointKind::Voltage, Channel::Ch3),
            (0.0, 5.0)
        );
        assert_eq!(
            setpoint_range(SetpointKind::Current, Channel::Ch3),
            (0.0, 3.0)
        );
    }

    #[tokio::test]
    async fn test_out_of_range_setpoint_generates_no_traffic() {
        let (link, handle) = scripted_link();
        let supply = Dp832::new(link, Duration::ZERO);

        let err = supply
            .set_setpoint(SetpointKind::Voltage, Channel::Ch3, 12.0)
            .await
            .unwrap_err();
        assert!(matches!(err, PsuError::Range { .. }));

        let err = supply
            .set_setpoint(SetpointKind::Current, Channel::Ch1, -0.5)
            .await
            .unwrap_err();
        assert!(matches!(err, PsuError::Range { .. }));

        let err = supply
            .set_protection_limit(ProtectionKind::OverCurrent, Channel::Ch1, 3.5)
            .await
            .unwrap_err();
        assert!(matches!(err, PsuError::Range { .. }));

        assert!(handle.exchanges().is_empty());
    }

    #[tokio::test]
    async fn test_setpoint_selects_channel_then_programs_value() {
        let (link, handle) = scripted_link();
        let supply = Dp832::new(link, Duration::ZERO);

        supply
            .set_setpoint(SetpointKind::Voltage, Channel::Ch2, 12.0)
            .await
            .unwrap();

        assert_eq!(handle.commands(), vec!["INST:SELE CH2", ":VOLT 12"]);
    }

    #[tokio::test]
    async fn test_boundary_values_accepted() {
        let (link, handle) = scripted_link();
        let supply = Dp832::new(link, Duration::ZERO);

        supply
            .set_setpoint(SetpointKind::Voltage, Channel::Ch3, 5.0)
            .await
            .unwrap();
        supply
            .set_setpoint(SetpointKind::Current, Channel::Ch1, 0.0)
            .await
            .unwrap();
        assert_eq!(handle.exchanges().len(), 4);
    }

    #[tokio::test]
    async fn test_read_output_state_maps_unknown() {
        let (link, handle) = scripted_link();
        handle.set_response("OUTP? CH1", "ON");
        handle.set_response("OUTP? CH2", "glitch");
        let supply = Dp832::new(link, Duration::ZERO);

        assert_eq!(
            supply.read_output_state(Channel::Ch1).await.unwrap(),
            OutputState::On
        );
        assert_eq!(
            supply.read_output_state(Channel::Ch2).await.unwrap(),
            OutputState::Unknown
        );
    }

    #[tokio::test]
    async fn test_measure_cycle_fails_fast() {
        let (link, handle) = scripted_link();
        handle.set_response("MEAS:ALL? CH1", "1.0,1.0,1.0");
        handle.set_response("MEAS:ALL? CH3", "3.0,3.0,3.0");
        // CH2 is unscripted, so the cycle dies there.
        let supply = Dp832::new(link, Duration::ZERO);

        assert!(supply.measure_all_channels().await.is_err());
        let commands = handle.commands();
        assert_eq!(commands, vec!["MEAS:ALL? CH1", "MEAS:ALL? CH2"]);
    }

    #[tokio::test]
    async fn test_read_protection_limit() {
        let (link, handle) = scripted_link();
        handle.set_response("OUTP:OVP:VAL? CH1", "25.000");
        let supply = Dp832::new(link, Duration::ZERO);

        let limit = supply
            .read_protection_limit(ProtectionKind::OverVoltage, Channel::Ch1)
            .await
            .unwrap();
        assert_eq!(limit, 25.0);
    }
}
