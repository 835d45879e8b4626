//! Core domain types for the DP832 power supply.

use crate::error::{PsuError, PsuResult};
use std::fmt;

/// One of the DP832's three output channels.
///
/// The wire protocol numbers channels from 1; invalid indices are
/// unrepresentable by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// First output channel (0-30 V / 0-3 A).
    Ch1,
    /// Second output channel (0-30 V / 0-3 A).
    Ch2,
    /// Third output channel (0-5 V / 0-3 A).
    Ch3,
}

impl Channel {
    /// Number of output channels on the instrument.
    pub const COUNT: usize = 3;

    /// All channels in ascending index order. Poll cycles iterate this.
    pub const ALL: [Channel; Channel::COUNT] = [Channel::Ch1, Channel::Ch2, Channel::Ch3];

    /// 1-based channel number as used on the wire.
    pub fn number(self) -> u8 {
        match self {
            Channel::Ch1 => 1,
            Channel::Ch2 => 2,
            Channel::Ch3 => 3,
        }
    }

    /// 0-based index for storage arrays.
    pub fn index(self) -> usize {
        self.number() as usize - 1
    }

    /// Look up a channel by its 1-based number.
    pub fn from_number(number: u8) -> Option<Channel> {
        match number {
            1 => Some(Channel::Ch1),
            2 => Some(Channel::Ch2),
            3 => Some(Channel::Ch3),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CH{}", self.number())
    }
}

/// One channel's measured output values.
///
/// All three values come from a single combined `MEAS:ALL?` query and are
/// only ever stored together.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Measurement {
    /// Measured output voltage in volts.
    pub voltage: f64,
    /// Measured output current in amperes.
    pub current: f64,
    /// Measured output power in watts.
    pub power: f64,
}

impl Measurement {
    /// Parse the comma-separated `voltage,current,power` triple the
    /// instrument returns for a combined measurement query.
    pub fn parse(response: &str) -> PsuResult<Self> {
        let trimmed = response.trim();
        let fields: Vec<&str> = trimmed.split(',').collect();
        if fields.len() < 3 {
            return Err(PsuError::UnknownResponse(trimmed.to_string()));
        }
        let parse = |field: &str| {
            field
                .trim()
                .parse::<f64>()
                .map_err(|_| PsuError::UnknownResponse(trimmed.to_string()))
        };
        Ok(Self {
            voltage: parse(fields[0])?,
            current: parse(fields[1])?,
            power: parse(fields[2])?,
        })
    }
}

/// Regulation mode of an output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegulationMode {
    /// Constant-current regulation.
    ConstantCurrent,
    /// Constant-voltage regulation.
    ConstantVoltage,
    /// Unregulated output.
    #[default]
    Unregulated,
}

impl RegulationMode {
    /// Map a mode query response. Unrecognized responses read as
    /// unregulated, which is also the initial assumption at session start.
    pub fn from_response(response: &str) -> Self {
        match response.trim() {
            "CC" => RegulationMode::ConstantCurrent,
            "CV" => RegulationMode::ConstantVoltage,
            _ => RegulationMode::Unregulated,
        }
    }
}

impl fmt::Display for RegulationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RegulationMode::ConstantCurrent => "CC",
            RegulationMode::ConstantVoltage => "CV",
            RegulationMode::Unregulated => "UR",
        };
        write!(f, "{}", label)
    }
}

/// On/off state of an output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    /// Output is enabled.
    On,
    /// Output is disabled.
    Off,
    /// The instrument's answer was not recognized.
    Unknown,
}

impl OutputState {
    /// Map an output state query response; anything unrecognized is
    /// `Unknown` rather than an error.
    pub fn from_response(response: &str) -> Self {
        match response.trim() {
            "ON" => OutputState::On,
            "OFF" => OutputState::Off,
            _ => OutputState::Unknown,
        }
    }
}

impl fmt::Display for OutputState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OutputState::On => "ON",
            OutputState::Off => "OFF",
            OutputState::Unknown => "UNKNOWN",
        };
        write!(f, "{}", label)
    }
}

/// On/off state of a protection circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionState {
    /// Protection is armed.
    On,
    /// Protection is disarmed.
    Off,
    /// The instrument's answer was not recognized.
    Unknown,
}

impl ProtectionState {
    /// Map a protection state query response; anything unrecognized is
    /// `Unknown` rather than an error.
    pub fn from_response(response: &str) -> Self {
        match response.trim() {
            "ON" => ProtectionState::On,
            "OFF" => ProtectionState::Off,
            _ => ProtectionState::Unknown,
        }
    }
}

impl fmt::Display for ProtectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProtectionState::On => "ON",
            ProtectionState::Off => "OFF",
            ProtectionState::Unknown => "UNKNOWN",
        };
        write!(f, "{}", label)
    }
}

/// Which programmable set-point a writer targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetpointKind {
    /// Output voltage set-point.
    Voltage,
    /// Output current set-point.
    Current,
}

impl fmt::Display for SetpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SetpointKind::Voltage => "voltage",
            SetpointKind::Current => "current",
        };
        write!(f, "{}", label)
    }
}

/// Which protection circuit a writer targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionKind {
    /// Over-voltage protection.
    OverVoltage,
    /// Over-current protection.
    OverCurrent,
}

impl fmt::Display for ProtectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProtectionKind::OverVoltage => "OVP",
            ProtectionKind::OverCurrent => "OCP",
        };
        write!(f, "{}", label)
    }
}
