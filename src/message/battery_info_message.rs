use super::{be_i16, be_u16, be_u32, check_len, RegisterBlock};

/// Pack current, voltage and charge of a smart lithium battery
pub(crate) const BLOCK: RegisterBlock = RegisterBlock { register: 5042, words: 6 };

/// A message type which contains the pack level readings of a battery.
pub(crate) struct BatteryInfoMessage(Vec<u8>);

impl BatteryInfoMessage {
    pub fn new(data: Vec<u8>) -> anyhow::Result<Self> {
        check_len("battery info", &data, BLOCK.byte_len())?;
        log::debug!("BATTERY info response: {}", hex::encode(&data));
        Ok(Self(data))
    }

    /// Current in A, negative while discharging
    pub fn current(&self) -> f32 {
        be_i16(&self.0, 0) as f32 / 100_f32
    }

    pub fn voltage(&self) -> f32 {
        be_u16(&self.0, 2) as f32 / 10_f32
    }

    /// Remaining charge in Ah
    pub fn remaining_charge(&self) -> f32 {
        be_u32(&self.0, 4) as f32 / 1000_f32
    }

    /// Full capacity in Ah
    pub fn capacity(&self) -> f32 {
        be_u32(&self.0, 8) as f32 / 1000_f32
    }
}

#[test]
fn test_battery_info_fields() {
    // -1.5 A, 13.2 V, 50 Ah of 100 Ah
    let data = hex::decode("ff6a00840000c350000186a0").unwrap();
    let message = BatteryInfoMessage::new(data).unwrap();
    assert_eq!(message.current(), -1.5);
    assert_eq!(message.voltage(), 13.2);
    assert_eq!(message.remaining_charge(), 50.0);
    assert_eq!(message.capacity(), 100.0);
}
