use super::{ascii, check_len, RegisterBlock};

/// Model string of a charge controller
pub(crate) const CONTROLLER_BLOCK: RegisterBlock = RegisterBlock { register: 12, words: 8 };
/// Model string of a smart lithium battery
pub(crate) const BATTERY_BLOCK: RegisterBlock = RegisterBlock { register: 5122, words: 8 };

/// A message type which contains the device's model name.
pub(crate) struct DeviceInfoMessage(Vec<u8>);

impl DeviceInfoMessage {
    pub fn new(data: Vec<u8>) -> anyhow::Result<Self> {
        check_len("device info", &data, CONTROLLER_BLOCK.byte_len())?;
        Ok(Self(data))
    }

    pub fn model(&self) -> String {
        ascii(&self.0[0..16])
    }
}

#[test]
fn test_model() {
    let message = DeviceInfoMessage::new(b"  RNG-CTRL-RVR40".to_vec()).unwrap();
    assert_eq!(message.model(), "RNG-CTRL-RVR40");
}
