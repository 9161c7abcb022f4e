//! Command line configuration.

use std::path::PathBuf;

use clap::{ArgGroup, Parser, ValueEnum};

/// Kind of Renogy device on the other end of the Bluetooth link
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeviceType {
    /// Rover family charge controller behind a BT-1 or BT-2 module
    Controller,
    /// Smart lithium battery
    Battery,
}

impl DeviceType {
    /// The Modbus id the device answers to out of the box
    pub fn default_device_id(&self) -> u8 {
        match self {
            Self::Controller => 255,
            Self::Battery => 48,
        }
    }
}

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
#[command(group(ArgGroup::new("target").required(true).multiple(true).args(["address", "alias"])))]
pub struct Args {
    /// MAC address of the Bluetooth module, e.g. AA:BB:CC:DD:EE:FF
    #[arg(short, long, value_parser = parse_mac)]
    pub address: Option<String>,
    /// Advertised name of the Bluetooth module, e.g. BT-TH-B00FXXXX
    #[arg(long)]
    pub alias: Option<String>,
    #[arg(short = 't', long, value_enum, default_value_t = DeviceType::Controller)]
    pub device_type: DeviceType,
    /// Modbus id of the device [default: 255 for controllers, 48 for batteries]
    #[arg(long)]
    pub device_id: Option<u8>,
    #[arg(short, long, env = "DISCORD_WEBHOOK_URL", hide_env_values = true)]
    pub webhook_url: String,
    /// Seconds between readings
    #[arg(short, long, default_value_t = 60)]
    pub poll_interval: u64,
    /// Seconds to wait for the webhook to answer
    #[arg(long, default_value_t = 10)]
    pub webhook_timeout: u64,
    #[arg(long, default_value = "renogy_monitor.log")]
    pub log_file: PathBuf,
}

impl Args {
    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig {
            address: self.address.clone(),
            alias: self.alias.clone(),
            device_type: self.device_type,
            device_id: self
                .device_id
                .unwrap_or_else(|| self.device_type.default_device_id()),
        }
    }
}

/// Accept a full colon separated MAC address, normalised to upper case.
fn parse_mac(s: &str) -> Result<String, String> {
    let octets: Vec<&str> = s.trim().split(':').collect();
    let valid = octets.len() == 6
        && octets
            .iter()
            .all(|octet| octet.len() == 2 && octet.chars().all(|c| c.is_ascii_hexdigit()));
    if valid {
        Ok(octets.join(":").to_uppercase())
    } else {
        Err(format!("expected a MAC address like AA:BB:CC:DD:EE:FF, got {s:?}"))
    }
}

/// Which device to connect to and how to address it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub address: Option<String>,
    pub alias: Option<String>,
    pub device_type: DeviceType,
    pub device_id: u8,
}

impl DeviceConfig {
    /// Whether an advertising device is the configured one.
    ///
    /// `id` is the platform's device identifier, which carries the MAC
    /// address on Linux and Windows.
    pub fn matches(&self, name: Option<&str>, id: &str) -> bool {
        let alias_matches = match (&self.alias, name) {
            (Some(alias), Some(name)) => name.trim() == alias,
            _ => false,
        };
        let address_matches = self.address.as_ref().is_some_and(|address| {
            let address = address.to_uppercase();
            id.to_uppercase()
                .split(|c: char| !(c.is_ascii_hexdigit() || c == ':'))
                .any(|token| token.ends_with(&address))
        });
        alias_matches || address_matches
    }

    /// How the device is named in log lines
    pub fn label(&self) -> &str {
        self.alias
            .as_deref()
            .or(self.address.as_deref())
            .unwrap_or("unknown")
    }
}

#[cfg(test)]
fn parse(args: &[&str]) -> Result<Args, clap::Error> {
    Args::try_parse_from(
        ["renogy-discord-alert", "--webhook-url", "https://discord.invalid/hook"]
            .iter()
            .chain(args)
            .copied(),
    )
}

#[test]
fn test_default_device_id_follows_type() {
    let args = parse(&["--alias", "BT-TH-1234"]).unwrap();
    assert_eq!(args.device_config().device_id, 255);
    assert_eq!(args.poll_interval, 60);
    assert_eq!(args.webhook_timeout, 10);
    assert_eq!(args.log_file, PathBuf::from("renogy_monitor.log"));

    let args = parse(&["--alias", "BT-TH-1234", "-t", "battery"]).unwrap();
    assert_eq!(args.device_config().device_id, 48);

    let args = parse(&["--alias", "BT-TH-1234", "-t", "battery", "--device-id", "49"]).unwrap();
    assert_eq!(args.device_config().device_id, 49);
}

#[test]
fn test_address_or_alias_required() {
    assert!(parse(&[]).is_err());
    assert!(parse(&["--address", "AA:BB:CC:DD:EE:FF"]).is_ok());
}

#[test]
fn test_address_must_be_a_full_mac() {
    assert!(parse(&["--address", ""]).is_err());
    assert!(parse(&["--address", "DD:EE:FF"]).is_err());
    assert!(parse(&["--address", "AA:BB:CC:DD:EE:GG"]).is_err());

    let args = parse(&["--address", "aa:bb:cc:dd:ee:ff"]).unwrap();
    assert_eq!(args.address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
}

#[test]
fn test_matches_alias_or_address() {
    let config = DeviceConfig {
        address: Some("aa:bb:cc:dd:ee:ff".to_string()),
        alias: Some("BT-TH-1234".to_string()),
        device_type: DeviceType::Controller,
        device_id: 255,
    };
    assert!(config.matches(Some("BT-TH-1234 "), "DeviceId(hci0/11:22:33:44:55:66)"));
    assert!(config.matches(None, "DeviceId(hci0/AA:BB:CC:DD:EE:FF)"));
    assert!(!config.matches(Some("BT-TH-9999"), "DeviceId(hci0/11:22:33:44:55:66)"));
}

#[test]
fn test_address_does_not_match_inside_other_id() {
    let config = DeviceConfig {
        address: Some("AA:BB:CC:DD:EE:FF".to_string()),
        alias: None,
        device_type: DeviceType::Controller,
        device_id: 255,
    };
    assert!(config.matches(None, "DeviceId { adapter: \"hci0\", device: AA:BB:CC:DD:EE:FF }"));
    assert!(!config.matches(None, "DeviceId(hci0/AA:BB:CC:DD:EE:FF:01)"));
    assert!(!config.matches(None, "DeviceId(hci0/11:22:33:44:55:66)"));
}
