//! Warmup settings: the daily-volume ramp and the local send window.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::WarmupError;

/// Volume ramp and send window for one sending account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupSettings {
    pub enabled: bool,
    pub current_daily_limit: u32,
    pub max_daily_limit: u32,
    /// Added to `current_daily_limit` on every ramp tick.
    pub ramp_up_rate: u32,
    /// Local hour the window opens (0..=23).
    pub send_window_start: u32,
    /// Local hour the window closes, exclusive (0..=24). Smaller than the start
    /// means the window wraps past midnight.
    pub send_window_end: u32,
    /// IANA zone name, e.g. `Europe/Berlin`.
    pub timezone: String,
}

impl Default for WarmupSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            current_daily_limit: 10,
            max_daily_limit: 50,
            ramp_up_rate: 5,
            send_window_start: 9,
            send_window_end: 17,
            timezone: "UTC".to_string(),
        }
    }
}

impl WarmupSettings {
    pub fn validate(&self) -> Result<(), WarmupError> {
        if self.current_daily_limit > self.max_daily_limit {
            return Err(WarmupError::InvalidSettings(format!(
                "current daily limit {} exceeds max daily limit {}",
                self.current_daily_limit, self.max_daily_limit
            )));
        }
        if self.send_window_start > 23 {
            return Err(WarmupError::InvalidSettings(format!(
                "send window start {} is not an hour (0-23)",
                self.send_window_start
            )));
        }
        if self.send_window_end > 24 {
            return Err(WarmupError::InvalidSettings(format!(
                "send window end {} is not an hour (0-24)",
                self.send_window_end
            )));
        }
        if self.send_window_start == self.send_window_end {
            return Err(WarmupError::InvalidSettings(
                "send window is empty (start equals end)".to_string(),
            ));
        }
        self.tz()?;
        Ok(())
    }

    /// Parse the configured zone.
    pub fn tz(&self) -> Result<Tz, WarmupError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| WarmupError::UnknownTimezone(self.timezone.clone()))
    }

    /// Whether a local hour (0..=23) falls in `[start, end)`.
    pub fn in_window(&self, hour: u32) -> bool {
        let (start, end) = (self.send_window_start, self.send_window_end);
        if start < end {
            hour >= start && hour < end
        } else {
            hour >= start || hour < end
        }
    }

    /// Days of ramping until the max is reached.
    ///
    /// `Some(0)` when already at max; `None` when the ramp rate is zero and the
    /// max is never reached.
    pub fn days_to_max_capacity(&self) -> Option<u32> {
        let remaining = self.max_daily_limit.saturating_sub(self.current_daily_limit);
        if remaining == 0 {
            return Some(0);
        }
        if self.ramp_up_rate == 0 {
            return None;
        }
        Some(remaining.div_ceil(self.ramp_up_rate))
    }

    /// Apply one ramp step, capped at the max. Returns whether the limit changed.
    pub fn ramp_up(&mut self) -> bool {
        let next = self
            .current_daily_limit
            .saturating_add(self.ramp_up_rate)
            .min(self.max_daily_limit);
        let changed = next != self.current_daily_limit;
        self.current_daily_limit = next;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(current: u32, max: u32, rate: u32) -> WarmupSettings {
        WarmupSettings {
            current_daily_limit: current,
            max_daily_limit: max,
            ramp_up_rate: rate,
            ..Default::default()
        }
    }

    #[test]
    fn days_to_max_rounds_up() {
        assert_eq!(settings(10, 50, 5).days_to_max_capacity(), Some(8));
        assert_eq!(settings(10, 50, 7).days_to_max_capacity(), Some(6));
    }

    #[test]
    fn days_to_max_at_max_is_zero() {
        assert_eq!(settings(50, 50, 0).days_to_max_capacity(), Some(0));
        assert_eq!(settings(50, 50, 5).days_to_max_capacity(), Some(0));
    }

    #[test]
    fn zero_ramp_never_reaches_max() {
        assert_eq!(settings(10, 50, 0).days_to_max_capacity(), None);
    }

    #[test]
    fn ramp_up_caps_at_max() {
        let mut s = settings(45, 50, 10);
        assert!(s.ramp_up());
        assert_eq!(s.current_daily_limit, 50);
        assert!(!s.ramp_up());
        assert_eq!(s.current_daily_limit, 50);
    }

    #[test]
    fn validate_rejects_current_above_max() {
        let err = settings(60, 50, 5).validate().unwrap_err();
        assert!(matches!(err, WarmupError::InvalidSettings(_)));
    }

    #[test]
    fn validate_rejects_unknown_timezone() {
        let s = WarmupSettings {
            timezone: "Mars/Olympus".into(),
            ..Default::default()
        };
        assert!(matches!(s.validate(), Err(WarmupError::UnknownTimezone(_))));
    }

    #[test]
    fn validate_rejects_bad_window() {
        let empty = WarmupSettings {
            send_window_start: 9,
            send_window_end: 9,
            ..Default::default()
        };
        assert!(empty.validate().is_err());

        let past_midnight = WarmupSettings {
            send_window_end: 25,
            ..Default::default()
        };
        assert!(past_midnight.validate().is_err());
    }

    #[test]
    fn default_settings_are_valid() {
        WarmupSettings::default().validate().unwrap();
    }

    #[test]
    fn window_is_half_open() {
        let s = WarmupSettings::default();
        assert!(!s.in_window(8));
        assert!(s.in_window(9));
        assert!(s.in_window(16));
        assert!(!s.in_window(17));
    }

    #[test]
    fn window_wraps_midnight() {
        let s = WarmupSettings {
            send_window_start: 22,
            send_window_end: 6,
            ..Default::default()
        };
        assert!(s.in_window(23));
        assert!(s.in_window(0));
        assert!(s.in_window(5));
        assert!(!s.in_window(6));
        assert!(!s.in_window(12));
    }

    #[test]
    fn camel_case_wire_shape() {
        let value = serde_json::to_value(WarmupSettings::default()).unwrap();
        assert_eq!(value["currentDailyLimit"], 10);
        assert_eq!(value["sendWindowStart"], 9);
    }
}
