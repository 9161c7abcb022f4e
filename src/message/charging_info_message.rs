use super::{be_u16, be_u32, check_len, RegisterBlock};
use crate::telemetry::{BatteryType, ChargingStatus, ControllerState};

/// The controller's live charging and load status
pub(crate) const BLOCK: RegisterBlock = RegisterBlock { register: 256, words: 34 };

/// A message type which contains battery, load and solar panel readings of a charge controller.
pub(crate) struct ChargingInfoMessage(Vec<u8>);

impl ChargingInfoMessage {
    pub fn new(data: Vec<u8>) -> anyhow::Result<Self> {
        check_len("charging info", &data, BLOCK.byte_len())?;
        log::debug!("CONTROLLER charging info response: {}", hex::encode(&data));
        Ok(Self(data))
    }

    pub fn battery_percentage(&self) -> u16 {
        be_u16(&self.0, 0)
    }

    pub fn battery_voltage(&self) -> f32 {
        be_u16(&self.0, 2) as f32 / 10_f32
    }

    pub fn battery_current(&self) -> f32 {
        be_u16(&self.0, 4) as f32 / 100_f32
    }

    pub fn controller_temperature(&self) -> i16 {
        parse_temperature(self.0[6])
    }

    pub fn battery_temperature(&self) -> i16 {
        parse_temperature(self.0[7])
    }

    pub fn load_voltage(&self) -> f32 {
        be_u16(&self.0, 8) as f32 / 10_f32
    }

    pub fn load_current(&self) -> f32 {
        be_u16(&self.0, 10) as f32 / 100_f32
    }

    pub fn load_power(&self) -> u16 {
        be_u16(&self.0, 12)
    }

    pub fn pv_voltage(&self) -> f32 {
        be_u16(&self.0, 14) as f32 / 10_f32
    }

    pub fn pv_current(&self) -> f32 {
        be_u16(&self.0, 16) as f32 / 100_f32
    }

    pub fn pv_power(&self) -> u16 {
        be_u16(&self.0, 18)
    }

    pub fn load_on(&self) -> bool {
        self.0[64] >> 7 == 1
    }

    pub fn charging_status(&self) -> Option<ChargingStatus> {
        ChargingStatus::from_raw(self.0[65])
    }

    /// Combine with the separately read model and battery type blocks.
    pub fn into_state(self, model: String, battery_type: Option<BatteryType>) -> ControllerState {
        ControllerState {
            model,
            battery_percentage: self.battery_percentage(),
            battery_voltage: self.battery_voltage(),
            battery_current: self.battery_current(),
            battery_temperature: self.battery_temperature(),
            controller_temperature: self.controller_temperature(),
            load_on: self.load_on(),
            load_voltage: self.load_voltage(),
            load_current: self.load_current(),
            load_power: self.load_power(),
            pv_voltage: self.pv_voltage(),
            pv_current: self.pv_current(),
            pv_power: self.pv_power(),
            max_charging_power_today: be_u16(&self.0, 30),
            max_discharging_power_today: be_u16(&self.0, 32),
            charging_amp_hours_today: be_u16(&self.0, 34),
            discharging_amp_hours_today: be_u16(&self.0, 36),
            power_generation_today: be_u16(&self.0, 38),
            power_consumption_today: be_u16(&self.0, 40),
            power_generation_total: be_u32(&self.0, 56),
            charging_status: self.charging_status(),
            battery_type,
        }
    }
}

/// Temperatures are a sign bit followed by a 7 bit magnitude in °C.
fn parse_temperature(raw: u8) -> i16 {
    if raw >> 7 == 1 {
        -(raw as i16 - 128)
    } else {
        raw as i16
    }
}

#[cfg(test)]
fn sample_payload() -> Vec<u8> {
    let mut data = vec![0u8; BLOCK.byte_len()];
    data[0..2].copy_from_slice(&45u16.to_be_bytes());
    data[2..4].copy_from_slice(&129u16.to_be_bytes());
    data[4..6].copy_from_slice(&250u16.to_be_bytes());
    data[6] = 25;
    data[7] = 0x85;
    data[8..10].copy_from_slice(&128u16.to_be_bytes());
    data[10..12].copy_from_slice(&75u16.to_be_bytes());
    data[12..14].copy_from_slice(&9u16.to_be_bytes());
    data[14..16].copy_from_slice(&184u16.to_be_bytes());
    data[16..18].copy_from_slice(&310u16.to_be_bytes());
    data[18..20].copy_from_slice(&57u16.to_be_bytes());
    data[38..40].copy_from_slice(&420u16.to_be_bytes());
    data[56..60].copy_from_slice(&123_456u32.to_be_bytes());
    data[64] = 0x80;
    data[65] = 2;
    data
}

#[test]
fn test_charging_info_fields() {
    let message = ChargingInfoMessage::new(sample_payload()).unwrap();
    let state = message.into_state("RNG-CTRL-RVR40".to_string(), Some(BatteryType::Lithium));
    assert_eq!(state.battery_percentage, 45);
    assert_eq!(state.battery_voltage, 12.9);
    assert_eq!(state.battery_current, 2.5);
    assert_eq!(state.controller_temperature, 25);
    assert_eq!(state.battery_temperature, -5);
    assert_eq!(state.load_voltage, 12.8);
    assert_eq!(state.load_current, 0.75);
    assert_eq!(state.load_power, 9);
    assert_eq!(state.pv_voltage, 18.4);
    assert_eq!(state.pv_current, 3.1);
    assert_eq!(state.pv_power, 57);
    assert_eq!(state.power_generation_today, 420);
    assert_eq!(state.power_generation_total, 123_456);
    assert!(state.load_on);
    assert_eq!(state.charging_status, Some(ChargingStatus::Mppt));
    assert_eq!(state.battery_type, Some(BatteryType::Lithium));
}

#[test]
fn test_charging_info_unknown_status() {
    let mut data = sample_payload();
    data[64] = 0x00;
    data[65] = 9;
    let message = ChargingInfoMessage::new(data).unwrap();
    assert!(!message.load_on());
    assert_eq!(message.charging_status(), None);
}

#[test]
fn test_charging_info_short_payload() {
    assert!(ChargingInfoMessage::new(vec![0u8; 20]).is_err());
}

#[test]
fn test_parse_temperature() {
    assert_eq!(parse_temperature(0x00), 0);
    assert_eq!(parse_temperature(0x7f), 127);
    assert_eq!(parse_temperature(0x81), -1);
}
