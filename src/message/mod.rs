//! Register blocks read from Renogy devices.
//!
//! Each message wraps the payload of one "read holding registers" response
//! (the bytes between the byte-count header and the CRC). Constructors check
//! the payload is long enough, so the accessors can index directly.

pub(crate) mod battery_info_message;
pub(crate) mod battery_type_message;
pub(crate) mod cell_temperature_message;
pub(crate) mod cell_voltage_message;
pub(crate) mod charging_info_message;
pub(crate) mod device_info_message;

use anyhow::anyhow;

/// A run of holding registers: the first register and the number of 16 bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RegisterBlock {
    pub register: u16,
    pub words: u16,
}

impl RegisterBlock {
    pub const fn byte_len(&self) -> usize {
        self.words as usize * 2
    }
}

fn check_len(name: &str, data: &[u8], min_len: usize) -> anyhow::Result<()> {
    if data.len() < min_len {
        let h = hex::encode(data);
        return Err(anyhow!(
            "{name} payload too short: expected at least {min_len} bytes, got {}: {h}",
            data.len()
        ));
    }
    Ok(())
}

fn be_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

fn be_i16(data: &[u8], offset: usize) -> i16 {
    i16::from_be_bytes([data[offset], data[offset + 1]])
}

fn be_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Decode a space or NUL padded ASCII field.
fn ascii(data: &[u8]) -> String {
    String::from_utf8_lossy(data)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

#[test]
fn test_ascii_trims_padding() {
    assert_eq!(ascii(b"  RNG-CTRL-RVR40\0"), "RNG-CTRL-RVR40");
}

#[test]
fn test_check_len_rejects_short_payload() {
    let err = check_len("test", &[0x01, 0x02], 4).unwrap_err();
    assert!(err.to_string().contains("0102"));
}
