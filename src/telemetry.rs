use std::fmt;
use std::future::Future;

/// Charging stage reported by a charge controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargingStatus {
    Deactivated,
    Activated,
    Mppt,
    Equalizing,
    Boost,
    Floating,
    CurrentLimiting,
}

impl ChargingStatus {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Deactivated),
            1 => Some(Self::Activated),
            2 => Some(Self::Mppt),
            3 => Some(Self::Equalizing),
            4 => Some(Self::Boost),
            5 => Some(Self::Floating),
            6 => Some(Self::CurrentLimiting),
            _ => None,
        }
    }
}

impl fmt::Display for ChargingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Deactivated => "deactivated",
            Self::Activated => "activated",
            Self::Mppt => "mppt",
            Self::Equalizing => "equalizing",
            Self::Boost => "boost",
            Self::Floating => "floating",
            Self::CurrentLimiting => "current limiting",
        };
        f.write_str(s)
    }
}

/// Battery chemistry a charge controller is configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryType {
    Open,
    Sealed,
    Gel,
    Lithium,
    Custom,
}

impl BatteryType {
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(Self::Open),
            2 => Some(Self::Sealed),
            3 => Some(Self::Gel),
            4 => Some(Self::Lithium),
            5 => Some(Self::Custom),
            _ => None,
        }
    }
}

/// The reported state of a charge controller
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerState {
    pub model: String,
    /// State of charge of the battery in %
    pub battery_percentage: u16,
    /// Battery voltage in V
    pub battery_voltage: f32,
    /// Battery charge current in A
    pub battery_current: f32,
    /// Battery temperature in °C
    pub battery_temperature: i16,
    /// Controller temperature in °C
    pub controller_temperature: i16,
    pub load_on: bool,
    pub load_voltage: f32,
    pub load_current: f32,
    /// Load power in W
    pub load_power: u16,
    pub pv_voltage: f32,
    pub pv_current: f32,
    /// Solar panel power in W
    pub pv_power: u16,
    pub max_charging_power_today: u16,
    pub max_discharging_power_today: u16,
    pub charging_amp_hours_today: u16,
    pub discharging_amp_hours_today: u16,
    /// Energy generated today in Wh
    pub power_generation_today: u16,
    /// Energy consumed today in Wh
    pub power_consumption_today: u16,
    /// Lifetime energy generated in Wh
    pub power_generation_total: u32,
    pub charging_status: Option<ChargingStatus>,
    pub battery_type: Option<BatteryType>,
}

/// The reported state of a smart lithium battery
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryState {
    pub model: String,
    /// The voltage of each cell in V
    pub cell_voltages: Vec<f32>,
    /// The reading of each temperature sensor in °C
    pub cell_temperatures: Vec<f32>,
    /// Pack current in A, negative while discharging
    pub current: f32,
    /// Pack voltage in V
    pub voltage: f32,
    /// Remaining charge in Ah
    pub remaining_charge: f32,
    /// Full capacity in Ah
    pub capacity: f32,
}

impl BatteryState {
    /// Remaining charge as a share of capacity in %, to one decimal place.
    ///
    /// `None` when the battery reports no capacity.
    pub fn percentage(&self) -> Option<f32> {
        if self.capacity > 0.0 {
            Some((self.remaining_charge / self.capacity * 1000.0).round() / 10.0)
        } else {
            None
        }
    }
}

/// One complete reading of the monitored device
#[derive(Debug, Clone, PartialEq)]
pub enum Telemetry {
    Controller(ControllerState),
    Battery(BatteryState),
}

impl Telemetry {
    pub fn battery_voltage(&self) -> f32 {
        match self {
            Self::Controller(state) => state.battery_voltage,
            Self::Battery(state) => state.voltage,
        }
    }

    pub fn battery_percentage(&self) -> Option<f32> {
        match self {
            Self::Controller(state) => Some(f32::from(state.battery_percentage)),
            Self::Battery(state) => state.percentage(),
        }
    }
}

/// Something that can be polled for readings and released afterwards.
pub trait TelemetrySource {
    fn fetch_telemetry(&mut self) -> impl Future<Output = anyhow::Result<Telemetry>>;

    /// Release the device. Called once when monitoring ends.
    fn stop(self) -> impl Future<Output = anyhow::Result<()>>;
}

#[cfg(test)]
fn battery(remaining_charge: f32, capacity: f32) -> BatteryState {
    BatteryState {
        model: "RBT100LFP12S".to_string(),
        cell_voltages: vec![3.3; 4],
        cell_temperatures: vec![21.0],
        current: -1.5,
        voltage: 13.2,
        remaining_charge,
        capacity,
    }
}

#[test]
fn test_battery_percentage_rounds() {
    assert_eq!(battery(33.333, 100.0).percentage(), Some(33.3));
    assert_eq!(battery(50.0, 100.0).percentage(), Some(50.0));
}

#[test]
fn test_battery_without_capacity_has_no_percentage() {
    let telemetry = Telemetry::Battery(battery(10.0, 0.0));
    assert_eq!(telemetry.battery_percentage(), None);
    assert_eq!(telemetry.battery_voltage(), 13.2);
}

#[test]
fn test_charging_status_display() {
    assert_eq!(ChargingStatus::CurrentLimiting.to_string(), "current limiting");
    assert_eq!(ChargingStatus::from_raw(5), Some(ChargingStatus::Floating));
}
