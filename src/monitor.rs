use std::fmt::Display;
use std::future::Future;

use tokio::time::{sleep, Duration};

use crate::alert::AlertTracker;
use crate::discord::DiscordWebhook;
use crate::telemetry::{Telemetry, TelemetrySource};

/// Turns telemetry into console output and Discord alerts.
pub struct Monitor {
    webhook: DiscordWebhook,
    alerts: AlertTracker,
}

impl Monitor {
    pub fn new(webhook: DiscordWebhook) -> Self {
        Self { webhook, alerts: AlertTracker::new() }
    }

    /// Read the device every `poll_interval` until the task is dropped.
    /// Failed readings are reported and polling carries on.
    pub async fn run<S: TelemetrySource>(
        &mut self,
        source: &mut S,
        poll_interval: Duration,
    ) -> anyhow::Result<()> {
        loop {
            match source.fetch_telemetry().await {
                Ok(telemetry) => self.on_data_received(&telemetry).await,
                Err(err) => Self::on_error(&err),
            }
            sleep(poll_interval).await;
        }
    }

    /// Poll like [`Monitor::run`] until `shutdown` completes, then stop the source.
    pub async fn run_until<S, F>(
        &mut self,
        mut source: S,
        poll_interval: Duration,
        shutdown: F,
    ) -> anyhow::Result<()>
    where
        S: TelemetrySource,
        F: Future<Output = ()>,
    {
        let result = tokio::select! {
            result = self.run(&mut source, poll_interval) => result,
            _ = shutdown => Ok(()),
        };

        if let Err(err) = source.stop().await {
            log::error!("Failed to disconnect: {err:#}");
        }
        result
    }

    /// Report the reading and send an alert for every newly crossed threshold.
    pub async fn on_data_received(&mut self, telemetry: &Telemetry) {
        let voltage = telemetry.battery_voltage();
        let percent = telemetry.battery_percentage();
        let level = percent.map_or_else(|| "None".to_string(), |p| p.to_string());

        log::info!("Battery Voltage: {voltage} V");
        log::info!("Battery Level: {level}%");
        println!("Battery Voltage: {voltage} V");
        println!("Battery Level: {level}%");
        log::debug!("{telemetry:?}");

        for alert in self.alerts.check(percent) {
            self.send_alert(&alert.message).await;
        }
    }

    pub fn on_error(error: &dyn Display) {
        log::error!("RenogyBT Error: {error}");
        println!("Error: {error}");
    }

    /// Post to the webhook. Failures are logged, never returned.
    async fn send_alert(&self, message: &str) {
        match self.webhook.send(message).await {
            Ok(()) => log::info!("Sent Discord alert: {message}"),
            Err(err) => log::error!("Failed to send Discord alert: {err:#}"),
        }
    }

    pub fn alerts(&self) -> &AlertTracker {
        &self.alerts
    }
}

#[cfg(test)]
fn controller(battery_percentage: u16) -> Telemetry {
    Telemetry::Controller(crate::telemetry::ControllerState {
        model: "RNG-CTRL-RVR40".to_string(),
        battery_percentage,
        battery_voltage: 12.4,
        battery_current: 0.0,
        battery_temperature: 20,
        controller_temperature: 25,
        load_on: false,
        load_voltage: 0.0,
        load_current: 0.0,
        load_power: 0,
        pv_voltage: 0.0,
        pv_current: 0.0,
        pv_power: 0,
        max_charging_power_today: 0,
        max_discharging_power_today: 0,
        charging_amp_hours_today: 0,
        discharging_amp_hours_today: 0,
        power_generation_today: 0,
        power_consumption_today: 0,
        power_generation_total: 0,
        charging_status: None,
        battery_type: None,
    })
}

#[cfg(test)]
fn content(body: &str) -> String {
    let value: serde_json::Value = serde_json::from_str(body).unwrap();
    value["content"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_alerts_sent_once_per_level() {
    let (url, mut bodies) = crate::discord::test_server::spawn("204 No Content").await;
    let webhook = DiscordWebhook::new(&url, DiscordWebhook::DEFAULT_TIMEOUT).unwrap();
    let mut monitor = Monitor::new(webhook);

    monitor.on_data_received(&controller(80)).await;
    monitor.on_data_received(&controller(38)).await;
    monitor.on_data_received(&controller(37)).await;
    monitor.on_data_received(&controller(30)).await;

    assert_eq!(content(&bodies.recv().await.unwrap()), "⚠️ Battery below 50%! (Current: 38%)");
    assert_eq!(content(&bodies.recv().await.unwrap()), "‼️ Battery below 40%! (Current: 38%)");
    assert_eq!(
        content(&bodies.recv().await.unwrap()),
        "🛑 Battery below 35%! SHUT DOWN SYSTEM AND CHARGE! (Current: 30%)"
    );
    assert!(bodies.try_recv().is_err());
}

#[tokio::test]
async fn test_failed_webhook_still_marks_level() {
    let (url, mut bodies) = crate::discord::test_server::spawn("500 Internal Server Error").await;
    let webhook = DiscordWebhook::new(&url, DiscordWebhook::DEFAULT_TIMEOUT).unwrap();
    let mut monitor = Monitor::new(webhook);

    monitor.on_data_received(&controller(45)).await;
    monitor.on_data_received(&controller(44)).await;

    assert!(monitor.alerts().is_alerted(50));
    assert!(bodies.recv().await.is_some());
    assert!(bodies.try_recv().is_err());
}

#[cfg(test)]
fn battery(remaining_charge: f32, capacity: f32) -> Telemetry {
    Telemetry::Battery(crate::telemetry::BatteryState {
        model: "RBT100LFP12S".to_string(),
        cell_voltages: vec![3.3; 4],
        cell_temperatures: vec![21.0],
        current: -1.5,
        voltage: 13.2,
        remaining_charge,
        capacity,
    })
}

#[tokio::test]
async fn test_battery_without_capacity_sends_nothing() {
    let (url, mut bodies) = crate::discord::test_server::spawn("204 No Content").await;
    let webhook = DiscordWebhook::new(&url, DiscordWebhook::DEFAULT_TIMEOUT).unwrap();
    let mut monitor = Monitor::new(webhook);

    monitor.on_data_received(&battery(10.0, 0.0)).await;

    assert!(bodies.try_recv().is_err());
    assert!(!monitor.alerts().is_alerted(50));
}

#[tokio::test]
async fn test_battery_alert_shows_fractional_percentage() {
    let (url, mut bodies) = crate::discord::test_server::spawn("204 No Content").await;
    let webhook = DiscordWebhook::new(&url, DiscordWebhook::DEFAULT_TIMEOUT).unwrap();
    let mut monitor = Monitor::new(webhook);

    monitor.on_data_received(&battery(33.333, 100.0)).await;

    let messages: Vec<String> = [
        bodies.recv().await.unwrap(),
        bodies.recv().await.unwrap(),
        bodies.recv().await.unwrap(),
    ]
    .iter()
    .map(|body| content(body))
    .collect();
    assert_eq!(messages[0], "⚠️ Battery below 50%! (Current: 33.3%)");
    assert!(messages.iter().all(|message| message.ends_with("(Current: 33.3%)")));
}

#[cfg(test)]
struct CountingSource {
    readings: std::sync::Arc<std::sync::atomic::AtomicU32>,
    stopped: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

#[cfg(test)]
impl TelemetrySource for CountingSource {
    async fn fetch_telemetry(&mut self) -> anyhow::Result<Telemetry> {
        let n = self.readings.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if n == 1 {
            return Err(anyhow::anyhow!("Message incomplete: ff03"));
        }
        Ok(controller(80))
    }

    async fn stop(self) -> anyhow::Result<()> {
        self.stopped.store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_source() {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    let readings = Arc::new(AtomicU32::new(0));
    let stopped = Arc::new(AtomicBool::new(false));
    let source = CountingSource { readings: readings.clone(), stopped: stopped.clone() };
    let webhook = DiscordWebhook::new("http://127.0.0.1:9/", DiscordWebhook::DEFAULT_TIMEOUT).unwrap();
    let mut monitor = Monitor::new(webhook);

    monitor
        .run_until(source, Duration::from_secs(60), sleep(Duration::from_secs(150)))
        .await
        .unwrap();

    // Readings at 0, 60 and 120 s; the failed second one does not end polling
    assert_eq!(readings.load(Ordering::SeqCst), 3);
    assert!(stopped.load(Ordering::SeqCst));
}
