//! Bluetooth Low Energy client for Renogy devices.
//!
//! Renogy's BT-1 and BT-2 modules (and the smart lithium batteries with
//! built-in Bluetooth) bridge a pair of GATT characteristics to the device's
//! RS485 bus. Requests are Modbus RTU "read holding registers" frames written
//! to one characteristic; responses come back as notifications on the other.

use anyhow::anyhow;
use bluest::Adapter;
use bluest::AdvertisingDevice;
use bluest::Characteristic;
use bluest::Device;
use bluest::Uuid;
use crc16::{State, MODBUS};
use futures_util::Stream;
use futures_util::StreamExt;
use tokio::time::timeout;
use tokio::time::Duration;

use crate::config::{DeviceConfig, DeviceType};
use crate::message::battery_info_message::{self, BatteryInfoMessage};
use crate::message::battery_type_message::{self, BatteryTypeMessage};
use crate::message::cell_temperature_message::{self, CellTemperatureMessage};
use crate::message::cell_voltage_message::{self, CellVoltageMessage};
use crate::message::charging_info_message::{self, ChargingInfoMessage};
use crate::message::device_info_message::{self, DeviceInfoMessage};
use crate::message::RegisterBlock;
use crate::telemetry::{BatteryState, ControllerState, Telemetry, TelemetrySource};

pub struct RenogyClient {
    adapter: Adapter,
    device: Device,
    write: Characteristic,
    notify: Characteristic,
    device_type: DeviceType,
    device_id: u8,
}

impl RenogyClient {
    const WRITE_SERVICE_ID: Uuid = Uuid::from_u128(0x0000ffd0_0000_1000_8000_00805f9b34fb);
    const WRITE_CHARACTERISTIC_ID: Uuid = Uuid::from_u128(0x0000ffd1_0000_1000_8000_00805f9b34fb);
    const NOTIFY_SERVICE_ID: Uuid = Uuid::from_u128(0x0000fff0_0000_1000_8000_00805f9b34fb);
    const NOTIFY_CHARACTERISTIC_ID: Uuid = Uuid::from_u128(0x0000fff1_0000_1000_8000_00805f9b34fb);
    const READ_HOLDING_REGISTERS: u8 = 0x03;
    // Set on the function code of an exception response
    const EXCEPTION_FLAG: u8 = 0x80;
    // How long to wait without any notifications before judging the received bytes
    const NOTIFICATION_TIMEOUT_S: u64 = 5;
    // Upper bound for a whole response, however chatty the device is
    const RESPONSE_TIMEOUT_S: u64 = 30;
    const DISCOVERY_TIMEOUT_S: u64 = 30;

    /// Disconnect from the device so the module is free for other centrals again
    pub async fn stop(self) -> anyhow::Result<()> {
        if self.device.is_connected().await {
            self.adapter.disconnect_device(&self.device).await?;
        }
        log::info!("Disconnected from device");
        Ok(())
    }

    /// Create a new `RenogyClient`, which includes discovering and connecting to the device.
    pub async fn new(config: &DeviceConfig) -> anyhow::Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or(anyhow!("Default adapter not found"))?;
        adapter.wait_available().await?;

        let device = timeout(
            Duration::from_secs(Self::DISCOVERY_TIMEOUT_S),
            Self::discover_device(config, &adapter),
        )
        .await
        .map_err(|_| anyhow!("Device not found"))??;

        adapter.connect_device(&device.device).await?;
        log::info!("Connected to {}", config.label());

        let write = Self::find_characteristic(
            &device.device,
            Self::WRITE_SERVICE_ID,
            Self::WRITE_CHARACTERISTIC_ID,
        )
        .await?;
        let notify = Self::find_characteristic(
            &device.device,
            Self::NOTIFY_SERVICE_ID,
            Self::NOTIFY_CHARACTERISTIC_ID,
        )
        .await?;

        Ok(Self {
            adapter,
            device: device.device,
            write,
            notify,
            device_type: config.device_type,
            device_id: config.device_id,
        })
    }

    /// Read the current state from the device
    pub async fn fetch_telemetry(&mut self) -> anyhow::Result<Telemetry> {
        self.try_connect().await?;

        match self.device_type {
            DeviceType::Controller => self.fetch_controller().await.map(Telemetry::Controller),
            DeviceType::Battery => self.fetch_battery().await.map(Telemetry::Battery),
        }
    }

    async fn fetch_controller(&self) -> anyhow::Result<ControllerState> {
        let device_info =
            DeviceInfoMessage::new(self.read_block(device_info_message::CONTROLLER_BLOCK).await?)?;
        let charging_info =
            ChargingInfoMessage::new(self.read_block(charging_info_message::BLOCK).await?)?;
        let battery_type =
            BatteryTypeMessage::new(self.read_block(battery_type_message::BLOCK).await?)?;

        Ok(charging_info.into_state(device_info.model(), battery_type.battery_type()))
    }

    async fn fetch_battery(&self) -> anyhow::Result<BatteryState> {
        let cell_voltage =
            CellVoltageMessage::new(self.read_block(cell_voltage_message::BLOCK).await?)?;
        let cell_temperature =
            CellTemperatureMessage::new(self.read_block(cell_temperature_message::BLOCK).await?)?;
        let battery_info =
            BatteryInfoMessage::new(self.read_block(battery_info_message::BLOCK).await?)?;
        let device_info =
            DeviceInfoMessage::new(self.read_block(device_info_message::BATTERY_BLOCK).await?)?;

        Ok(BatteryState {
            model: device_info.model(),
            cell_voltages: cell_voltage.cell_voltages(),
            cell_temperatures: cell_temperature.cell_temperatures(),
            current: battery_info.current(),
            voltage: battery_info.voltage(),
            remaining_charge: battery_info.remaining_charge(),
            capacity: battery_info.capacity(),
        })
    }

    async fn discover_device(
        config: &DeviceConfig,
        adapter: &Adapter,
    ) -> anyhow::Result<AdvertisingDevice> {
        let mut adapter_events = adapter.scan(&[]).await?;
        while let Some(device) = adapter_events.next().await {
            let name = match device.adv_data.local_name.clone() {
                Some(name) => Some(name),
                None => device.device.name_async().await.ok(),
            };
            let id = format!("{:?}", device.device.id());
            if config.matches(name.as_deref(), &id) {
                log::info!("target device is found: {id}");
                return Ok(device);
            }
            log::trace!("other device {id} {name:?}");
        }

        Err(anyhow!("Device not found"))
    }

    async fn find_characteristic(
        device: &Device,
        service_id: Uuid,
        characteristic_id: Uuid,
    ) -> anyhow::Result<Characteristic> {
        let service = device
            .discover_services_with_uuid(service_id)
            .await?
            .first()
            .ok_or(anyhow!("The device does not support the {service_id} service."))?
            .clone();
        let characteristic = service
            .discover_characteristics_with_uuid(characteristic_id)
            .await?
            .first()
            .ok_or(anyhow!("The device does not support the {characteristic_id} characteristic."))?
            .clone();
        Ok(characteristic)
    }

    async fn read_block(&self, block: RegisterBlock) -> anyhow::Result<Vec<u8>> {
        let rq = Self::build_request(self.device_id, block);
        self.request_response(&rq).await
    }

    async fn request_response(&self, rq: &[u8]) -> anyhow::Result<Vec<u8>> {
        let reader = self.notify.notify().await?;

        log::debug!("TX: {}", hex::encode(rq));

        self.write.write_without_response(rq).await?;

        Self::read_message(reader, self.device_id).await
    }

    /// Build a "read holding registers" request for `block`.
    ///
    /// The frame format is:
    ///
    /// Start Byte | End Byte | Meaning
    /// 0          | 0        | The device id
    /// 1          | 1        | The function code, 0x03
    /// 2          | 3        | The first register, big endian
    /// 4          | 5        | The number of registers, big endian
    /// 6          | 7        | A MODBUS CRC over bytes 0-5
    fn build_request(device_id: u8, block: RegisterBlock) -> [u8; 8] {
        let mut rq = [0u8; 8];
        rq[0] = device_id;
        rq[1] = Self::READ_HOLDING_REGISTERS;
        rq[2..4].copy_from_slice(&block.register.to_be_bytes());
        rq[4..6].copy_from_slice(&block.words.to_be_bytes());
        let crc = Self::crc(&rq[0..6]);
        rq[6..8].copy_from_slice(&crc);
        rq
    }

    /// Attempt to read a whole response from the device.
    ///
    /// A response can be split over several notifications. Notifications are
    /// appended until the bytes parse as a complete frame. If the device goes
    /// quiet for a few seconds first, whatever was received is judged as is.
    /// A device that never goes quiet is cut off after `RESPONSE_TIMEOUT_S`.
    async fn read_message<T, E>(reader: T, device_id: u8) -> anyhow::Result<Vec<u8>>
    where
        T: Stream<Item = Result<Vec<u8>, E>> + Unpin,
        E: std::error::Error + Send + Sync + 'static,
    {
        timeout(
            Duration::from_secs(Self::RESPONSE_TIMEOUT_S),
            Self::collect_message(reader, device_id),
        )
        .await
        .map_err(|_| {
            anyhow!("No complete response within {} s", Self::RESPONSE_TIMEOUT_S)
        })?
    }

    async fn collect_message<T, E>(mut reader: T, device_id: u8) -> anyhow::Result<Vec<u8>>
    where
        T: Stream<Item = Result<Vec<u8>, E>> + Unpin,
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut msg = Vec::<u8>::new();
        loop {
            let read_result =
                timeout(Duration::from_secs(Self::NOTIFICATION_TIMEOUT_S), reader.next()).await;

            match read_result {
                Err(_) => {
                    // timeout
                    let h_msg = hex::encode(&msg[..]);
                    return match Self::try_parse_msg(&msg[..], device_id) {
                        TryParseMessageResult::Ok(payload) => Ok(payload),
                        TryParseMessageResult::Exception(code) => {
                            Err(anyhow!("Device returned exception {code:#04x}: {h_msg}"))
                        }
                        TryParseMessageResult::Incomplete => {
                            Err(anyhow!("Message incomplete: {h_msg}"))
                        }
                        TryParseMessageResult::Invalid(e) => {
                            Err(anyhow!("Message invalid: {e}: {h_msg}"))
                        }
                    };
                }
                Ok(None) => {
                    log::warn!("End of notification stream");

                    return Err(anyhow!("end of notification stream"));
                }
                Ok(Some(Ok(data))) => {
                    log::debug!("RX notification: 0x{}", hex::encode(&data));

                    msg.extend_from_slice(&data);
                    match Self::try_parse_msg(&msg[..], device_id) {
                        TryParseMessageResult::Ok(payload) => return Ok(payload),
                        TryParseMessageResult::Exception(code) => {
                            let h_msg = hex::encode(&msg[..]);
                            return Err(anyhow!("Device returned exception {code:#04x}: {h_msg}"));
                        }
                        // Keep reading; a later notification may complete or correct it
                        TryParseMessageResult::Incomplete | TryParseMessageResult::Invalid(_) => {}
                    }
                }
                Ok(Some(Err(err))) => {
                    log::warn!("Notification error: {err}");

                    return Err(err.into());
                }
            }
        }
    }

    /// Attempt to parse the given response bytes returning the payload.
    ///
    /// The response format is:
    ///
    /// Start Byte | End Byte     | Meaning
    /// 0          | 0            | The device id
    /// 1          | 1            | The function code, 0x03
    /// 2          | 2            | The length in bytes of the payload
    /// 3          | x            | The payload
    /// x+1        | x+2          | A MODBUS CRC over the bytes 0-x
    ///
    /// An exception response is `[device id, 0x83, code, crc, crc]`.
    fn try_parse_msg(buffer: &[u8], device_id: u8) -> TryParseMessageResult {
        if buffer.len() < 3 {
            return TryParseMessageResult::Incomplete;
        }

        if buffer[0] != device_id {
            return TryParseMessageResult::Invalid("Unexpected device id");
        }

        let expected_len = match buffer[1] {
            Self::READ_HOLDING_REGISTERS => buffer[2] as usize + 5,
            code if code == Self::READ_HOLDING_REGISTERS | Self::EXCEPTION_FLAG => 5,
            _ => return TryParseMessageResult::Invalid("Unexpected function code"),
        };
        if buffer.len() < expected_len {
            return TryParseMessageResult::Incomplete;
        }

        if buffer.len() > expected_len {
            return TryParseMessageResult::Invalid("Too long");
        }

        let crc_actual = &buffer[buffer.len() - 2..];
        let crc_expected = Self::crc(&buffer[0..buffer.len() - 2]);
        if crc_actual != crc_expected {
            return TryParseMessageResult::Invalid("CRC check failed");
        }

        if buffer[1] != Self::READ_HOLDING_REGISTERS {
            return TryParseMessageResult::Exception(buffer[2]);
        }

        let payload = buffer[3..buffer.len() - 2].to_vec();
        TryParseMessageResult::Ok(payload)
    }

    /// Compute the CRC check value for the given bytes
    fn crc(data: &[u8]) -> [u8; 2] {
        State::<MODBUS>::calculate(data).to_le_bytes()
    }

    async fn try_connect(&self) -> anyhow::Result<()> {
        if !self.device.is_connected().await {
            log::warn!("Connection lost, reconnecting");
            self.adapter.connect_device(&self.device).await?;
        }

        Ok(())
    }
}

impl TelemetrySource for RenogyClient {
    async fn fetch_telemetry(&mut self) -> anyhow::Result<Telemetry> {
        RenogyClient::fetch_telemetry(self).await
    }

    async fn stop(self) -> anyhow::Result<()> {
        RenogyClient::stop(self).await
    }
}

#[derive(PartialEq, Eq, Debug)]
enum TryParseMessageResult {
    Ok(Vec<u8>),
    Exception(u8),
    Incomplete,
    Invalid(&'static str),
}

#[cfg(test)]
fn with_crc(mut frame: Vec<u8>) -> Vec<u8> {
    let crc = RenogyClient::crc(&frame);
    frame.extend_from_slice(&crc);
    frame
}

#[test]
fn test_build_request() {
    let rq = RenogyClient::build_request(0x01, RegisterBlock { register: 0, words: 1 });
    assert_eq!(rq, [0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0a]);
}

#[test]
fn test_build_request_charging_info() {
    let rq = RenogyClient::build_request(0xff, charging_info_message::BLOCK);
    assert_eq!(rq, [0xff, 0x03, 0x01, 0x00, 0x00, 0x22, 0xd1, 0xf1]);
}

// Charging info from a Rover at 45%, 12.9 V, 2.5 A, load on, MPPT charging
#[cfg(test)]
const CHARGING_INFO_FRAME: &str = "ff0344002d008100fa1985000000000000000000000000000000000000000000000000\
    0000000000000000000000000000000000000000000000000000000000000000008002000000bb";

#[test]
fn test_try_parse_message_happy() {
    let message = hex::decode(CHARGING_INFO_FRAME).unwrap();
    let result = RenogyClient::try_parse_msg(&message[..], 0xff);
    let TryParseMessageResult::Ok(payload) = result else {
        panic!("unexpected {result:?}");
    };
    assert_eq!(payload.len(), charging_info_message::BLOCK.byte_len());
    assert_eq!(&payload[0..8], &hex::decode("002d008100fa1985").unwrap()[..]);
    assert_eq!(&payload[64..66], &[0x80, 0x02]);
}

#[test]
fn test_try_parse_message_no_header() {
    let message = hex::decode("ff03").unwrap();
    let result = RenogyClient::try_parse_msg(&message[..], 0xff);
    assert_eq!(result, TryParseMessageResult::Incomplete);
}

#[test]
fn test_try_parse_message_incomplete() {
    let message = hex::decode(CHARGING_INFO_FRAME).unwrap();
    let result = RenogyClient::try_parse_msg(&message[..message.len() - 3], 0xff);
    assert_eq!(result, TryParseMessageResult::Incomplete);
}

#[test]
fn test_try_parse_message_bad_crc() {
    let mut message = hex::decode(CHARGING_INFO_FRAME).unwrap();
    let last = message.len() - 1;
    message[last] ^= 0x01;
    let result = RenogyClient::try_parse_msg(&message[..], 0xff);
    assert_eq!(result, TryParseMessageResult::Invalid("CRC check failed"));
}

#[test]
fn test_try_parse_message_too_long() {
    let mut message = hex::decode("ff030200049053").unwrap();
    message.push(0x00);
    let result = RenogyClient::try_parse_msg(&message[..], 0xff);
    assert_eq!(result, TryParseMessageResult::Invalid("Too long"));
}

#[test]
fn test_try_parse_message_other_device() {
    let message = hex::decode("300304000400215b29").unwrap();
    let result = RenogyClient::try_parse_msg(&message[..], 0xff);
    assert_eq!(result, TryParseMessageResult::Invalid("Unexpected device id"));
}

#[test]
fn test_try_parse_message_exception() {
    let message = hex::decode("ff8302a101").unwrap();
    let result = RenogyClient::try_parse_msg(&message[..], 0xff);
    assert_eq!(result, TryParseMessageResult::Exception(0x02));
}

#[test]
fn test_checksum() {
    // battery type response: lithium
    assert_eq!(RenogyClient::crc(&[0xff, 0x03, 0x02, 0x00, 0x04]), [0x90, 0x53]);
    // battery info response: -1.5 A, 13.2 V, 50 of 100 Ah
    let battery_info = hex::decode("30030cff6a00840000c350000186a0").unwrap();
    assert_eq!(RenogyClient::crc(&battery_info), [0x5b, 0x49]);
}

#[cfg(test)]
fn notifications(
    chunks: Vec<Vec<u8>>,
) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> + Unpin {
    futures_util::stream::iter(chunks.into_iter().map(Ok)).chain(futures_util::stream::pending())
}

#[tokio::test(start_paused = true)]
async fn test_read_message_joins_notifications() {
    let frame = with_crc(vec![0x30, 0x03, 0x04, 0x00, 0x04, 0x00, 0x21]);
    let reader = notifications(vec![frame[0..3].to_vec(), frame[3..].to_vec()]);
    let payload = RenogyClient::read_message(reader, 0x30).await.unwrap();
    assert_eq!(payload, vec![0x00, 0x04, 0x00, 0x21]);
}

#[tokio::test(start_paused = true)]
async fn test_read_message_times_out_incomplete() {
    let frame = with_crc(vec![0x30, 0x03, 0x04, 0x00, 0x04, 0x00, 0x21]);
    let reader = notifications(vec![frame[0..5].to_vec()]);
    let err = RenogyClient::read_message(reader, 0x30).await.unwrap_err();
    assert!(err.to_string().starts_with("Message incomplete"));
}

#[tokio::test(start_paused = true)]
async fn test_read_message_exception() {
    let reader = notifications(vec![with_crc(vec![0x30, 0x83, 0x02])]);
    let err = RenogyClient::read_message(reader, 0x30).await.unwrap_err();
    assert!(err.to_string().contains("exception 0x02"));
}

#[tokio::test]
async fn test_read_message_end_of_stream() {
    let reader = futures_util::stream::iter(Vec::<Result<Vec<u8>, std::io::Error>>::new());
    assert!(RenogyClient::read_message(reader, 0x30).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_read_message_gives_up_on_endless_noise() {
    let reader = Box::pin(futures_util::stream::unfold((), |()| async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        Some((Ok::<_, std::io::Error>(vec![0x00]), ()))
    }));
    let started = tokio::time::Instant::now();
    let err = RenogyClient::read_message(reader, 0x30).await.unwrap_err();
    assert!(err.to_string().starts_with("No complete response within 30 s"));
    assert_eq!(started.elapsed(), Duration::from_secs(RenogyClient::RESPONSE_TIMEOUT_S));
}
