use super::{be_u16, check_len, RegisterBlock};
use crate::telemetry::BatteryType;

/// The battery chemistry the controller is configured for
pub(crate) const BLOCK: RegisterBlock = RegisterBlock { register: 57348, words: 1 };

pub(crate) struct BatteryTypeMessage(Vec<u8>);

impl BatteryTypeMessage {
    pub fn new(data: Vec<u8>) -> anyhow::Result<Self> {
        check_len("battery type", &data, BLOCK.byte_len())?;
        Ok(Self(data))
    }

    pub fn battery_type(&self) -> Option<BatteryType> {
        BatteryType::from_raw(be_u16(&self.0, 0))
    }
}

#[test]
fn test_battery_type() {
    let message = BatteryTypeMessage::new(vec![0x00, 0x04]).unwrap();
    assert_eq!(message.battery_type(), Some(BatteryType::Lithium));

    let message = BatteryTypeMessage::new(vec![0x00, 0x07]).unwrap();
    assert_eq!(message.battery_type(), None);
}
