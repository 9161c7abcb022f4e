//! Low battery thresholds and alert de-duplication.
//!
//! Each threshold fires at most once per run. Levels are never cleared when
//! the battery recovers.

use std::collections::HashSet;

/// A charge level and the alert text sent when the battery drops below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold {
    pub level: u8,
    pub message: &'static str,
}

/// Checked in this order, so a single reading alerts from the mildest level down.
pub const THRESHOLDS: [Threshold; 3] = [
    Threshold { level: 50, message: "⚠️ Battery below 50%!" },
    Threshold { level: 40, message: "‼️ Battery below 40%!" },
    Threshold { level: 35, message: "🛑 Battery below 35%! SHUT DOWN SYSTEM AND CHARGE!" },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub level: u8,
    pub message: String,
}

/// Remembers which levels have already been alerted.
#[derive(Debug, Default)]
pub struct AlertTracker {
    alerted: HashSet<u8>,
}

impl AlertTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return an alert for every threshold the percentage is strictly below
    /// that has not fired before, and mark those levels as alerted.
    pub fn check(&mut self, percent: Option<f32>) -> Vec<Alert> {
        let Some(percent) = percent else {
            return Vec::new();
        };

        THRESHOLDS
            .iter()
            .filter(|threshold| percent < f32::from(threshold.level))
            .filter(|threshold| self.alerted.insert(threshold.level))
            .map(|threshold| Alert {
                level: threshold.level,
                message: format!("{} (Current: {percent}%)", threshold.message),
            })
            .collect()
    }

    pub fn is_alerted(&self, level: u8) -> bool {
        self.alerted.contains(&level)
    }
}

#[test]
fn test_no_alert_above_thresholds() {
    let mut tracker = AlertTracker::new();
    assert!(tracker.check(Some(80.0)).is_empty());
    assert!(tracker.check(Some(50.0)).is_empty());
    assert!(!tracker.is_alerted(50));
}

#[test]
fn test_missing_percentage_never_alerts() {
    let mut tracker = AlertTracker::new();
    assert!(tracker.check(None).is_empty());
    assert!(tracker.check(Some(f32::NAN)).is_empty());
}

#[test]
fn test_alert_message() {
    let mut tracker = AlertTracker::new();
    let alerts = tracker.check(Some(45.0));
    assert_eq!(
        alerts,
        vec![Alert { level: 50, message: "⚠️ Battery below 50%! (Current: 45%)".to_string() }]
    );
}

#[test]
fn test_each_level_alerts_once() {
    let mut tracker = AlertTracker::new();
    assert_eq!(tracker.check(Some(49.0)).len(), 1);
    assert!(tracker.check(Some(48.0)).is_empty());

    let alerts = tracker.check(Some(39.5));
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].level, 40);
    assert_eq!(alerts[0].message, "‼️ Battery below 40%! (Current: 39.5%)");
}

#[test]
fn test_deep_drop_alerts_all_levels_in_order() {
    let mut tracker = AlertTracker::new();
    let levels: Vec<u8> = tracker.check(Some(20.0)).iter().map(|a| a.level).collect();
    assert_eq!(levels, vec![50, 40, 35]);
    assert!(tracker.check(Some(10.0)).is_empty());
}

#[test]
fn test_recovery_does_not_rearm() {
    let mut tracker = AlertTracker::new();
    assert_eq!(tracker.check(Some(45.0)).len(), 1);
    assert!(tracker.check(Some(90.0)).is_empty());
    assert!(tracker.check(Some(45.0)).is_empty());
    assert!(tracker.is_alerted(50));
}
