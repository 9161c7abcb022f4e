//! Watch a Renogy solar charge controller or smart lithium battery over
//! Bluetooth Low Energy and post low battery alerts to a Discord webhook.
//!
//! Charge controllers of the Rover family are reached through a BT-1 or BT-2
//! Bluetooth module. Smart lithium batteries carry their own module. Both
//! speak a Modbus style request-response protocol over a pair of GATT
//! characteristics.
//!
//! Alerts fire when the battery drops below 50%, 40% and 35%, once per level.
//!
//! # Example
//!
//! ```no_run
//! # use std::time::Duration;
//! # use renogy_discord_alert::config::{DeviceConfig, DeviceType};
//! #
//! # #[tokio::main]
//! # pub async fn main() -> anyhow::Result<()> {
//!     let config = DeviceConfig {
//!         address: None,
//!         alias: Some("BT-TH-B00FXXXX".to_string()),
//!         device_type: DeviceType::Controller,
//!         device_id: 255,
//!     };
//!     let webhook = renogy_discord_alert::DiscordWebhook::new(
//!         "https://discord.com/api/webhooks/...",
//!         Duration::from_secs(10),
//!     )?;
//!     let mut client = renogy_discord_alert::RenogyClient::new(&config).await?;
//!     let mut monitor = renogy_discord_alert::Monitor::new(webhook);
//!     monitor.run(&mut client, Duration::from_secs(60)).await
//! # }
//! ```

pub mod alert;
pub mod config;
mod discord;
pub mod logging;
mod message;
mod monitor;
mod renogy_client;
mod telemetry;

pub use discord::DiscordWebhook;
pub use monitor::Monitor;
pub use renogy_client::RenogyClient;
pub use telemetry::{
    BatteryState, BatteryType, ChargingStatus, ControllerState, Telemetry, TelemetrySource,
};
