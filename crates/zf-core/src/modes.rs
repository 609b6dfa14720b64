//! Mode vocabulary shared by zones and the supervisor.

use core::fmt;

/// Thermal direction a circuit is driven in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ThermalDirection {
    #[default]
    Heat,
    Cool,
}

/// Global heat-pump operation mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum OperationMode {
    #[default]
    Auto,
    Heat,
    Cool,
    Off,
}

impl OperationMode {
    pub const OPTIONS: [OperationMode; 4] = [
        OperationMode::Auto,
        OperationMode::Heat,
        OperationMode::Cool,
        OperationMode::Off,
    ];

    /// Parse a user selected option. Returns `None` for anything outside
    /// `auto|heat|cool|off` (case-insensitive).
    pub fn parse_option(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(OperationMode::Auto),
            "heat" => Some(OperationMode::Heat),
            "cool" => Some(OperationMode::Cool),
            "off" => Some(OperationMode::Off),
            _ => None,
        }
    }

    /// Map the state of an external heat-pump mode sensor.
    ///
    /// Unknown values fall back to `Auto`.
    pub fn from_external_state(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "off" | "idle" => OperationMode::Off,
            "heat" | "heating" => OperationMode::Heat,
            "cool" | "cooling" => OperationMode::Cool,
            _ => OperationMode::Auto,
        }
    }

    /// Direction forced by this mode, if any.
    pub fn forced_direction(self) -> Option<ThermalDirection> {
        match self {
            OperationMode::Heat => Some(ThermalDirection::Heat),
            OperationMode::Cool => Some(ThermalDirection::Cool),
            OperationMode::Auto | OperationMode::Off => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperationMode::Auto => "auto",
            OperationMode::Heat => "heat",
            OperationMode::Cool => "cool",
            OperationMode::Off => "off",
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-zone user mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ManualMode {
    #[default]
    Auto,
    Off,
}

/// What a zone is currently doing, as reported to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum HvacAction {
    #[default]
    Off,
    Idle,
    Heating,
    Cooling,
}

impl HvacAction {
    pub fn active_for(direction: ThermalDirection) -> Self {
        match direction {
            ThermalDirection::Heat => HvacAction::Heating,
            ThermalDirection::Cool => HvacAction::Cooling,
        }
    }
}

/// How quickly a zone reacts to flow-temperature changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ZoneResponse {
    #[default]
    Slow,
    Fast,
}

/// Zone control algorithm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ControlMode {
    #[default]
    BangBang,
    Pwm,
}

/// Flow-temperature strategy used in heating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FlowMode {
    #[default]
    Simple,
    ProSupervisor,
}

/// Run state of the shared heat pump.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PumpState {
    #[default]
    Idle,
    Heat,
    Cool,
}

impl PumpState {
    pub fn running(direction: ThermalDirection) -> Self {
        match direction {
            ThermalDirection::Heat => PumpState::Heat,
            ThermalDirection::Cool => PumpState::Cool,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PumpState::Idle => "idle",
            PumpState::Heat => "heat",
            PumpState::Cool => "cool",
        }
    }
}
