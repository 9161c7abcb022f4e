use super::{be_u16, check_len, RegisterBlock};

/// Cell count followed by up to 16 cell voltages
pub(crate) const BLOCK: RegisterBlock = RegisterBlock { register: 5000, words: 17 };

/// A message type which contains the voltage of each battery cell.
pub(crate) struct CellVoltageMessage(Vec<u8>);

impl CellVoltageMessage {
    pub fn new(data: Vec<u8>) -> anyhow::Result<Self> {
        check_len("cell voltage", &data, 2)?;
        let cell_count = be_u16(&data, 0) as usize;
        check_len("cell voltage", &data, 2 + cell_count * 2)?;
        log::debug!("BATTERY cell voltage response: {}", hex::encode(&data));
        Ok(Self(data))
    }

    pub fn cell_count(&self) -> usize {
        be_u16(&self.0, 0) as usize
    }

    /// The voltage of each cell in V
    pub fn cell_voltages(&self) -> Vec<f32> {
        (0..self.cell_count())
            .map(|i| be_u16(&self.0, 2 + i * 2) as f32 / 10_f32)
            .collect()
    }
}

#[test]
fn test_cell_voltages() {
    let data = hex::decode("0004002100210020002100000000").unwrap();
    let message = CellVoltageMessage::new(data).unwrap();
    assert_eq!(message.cell_count(), 4);
    assert_eq!(message.cell_voltages(), vec![3.3, 3.3, 3.2, 3.3]);
}

#[test]
fn test_cell_count_exceeds_payload() {
    let data = hex::decode("001000210021").unwrap();
    assert!(CellVoltageMessage::new(data).is_err());
}
