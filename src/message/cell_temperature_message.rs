use super::{be_i16, be_u16, check_len, RegisterBlock};

/// Sensor count followed by up to 16 cell temperatures
pub(crate) const BLOCK: RegisterBlock = RegisterBlock { register: 5017, words: 17 };

/// A message type which contains the temperature sensors of a battery.
pub(crate) struct CellTemperatureMessage(Vec<u8>);

impl CellTemperatureMessage {
    pub fn new(data: Vec<u8>) -> anyhow::Result<Self> {
        check_len("cell temperature", &data, 2)?;
        let sensor_count = be_u16(&data, 0) as usize;
        check_len("cell temperature", &data, 2 + sensor_count * 2)?;
        log::debug!("BATTERY cell temperature response: {}", hex::encode(&data));
        Ok(Self(data))
    }

    /// The reading of each sensor in °C
    pub fn cell_temperatures(&self) -> Vec<f32> {
        (0..be_u16(&self.0, 0) as usize)
            .map(|i| be_i16(&self.0, 2 + i * 2) as f32 / 10_f32)
            .collect()
    }
}

#[test]
fn test_cell_temperatures() {
    let data = hex::decode("000200d2ffec").unwrap();
    let message = CellTemperatureMessage::new(data).unwrap();
    assert_eq!(message.cell_temperatures(), vec![21.0, -2.0]);
}
