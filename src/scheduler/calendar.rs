use crate::Result;
use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};

/// Weekday trading window in UTC
///
/// Open is inclusive, close exclusive. No holiday calendar - weekends are
/// the only closed days the core knows about.
#[derive(Debug, Clone)]
pub struct TradingCalendar {
    open: NaiveTime,
    close: NaiveTime,
}

impl TradingCalendar {
    pub fn new(open: NaiveTime, close: NaiveTime) -> Self {
        Self { open, close }
    }

    /// Parse "HH:MM" open/close times
    pub fn parse(open: &str, close: &str) -> Result<Self> {
        let open = NaiveTime::parse_from_str(open, "%H:%M")
            .map_err(|e| format!("invalid market open time '{}': {}", open, e))?;
        let close = NaiveTime::parse_from_str(close, "%H:%M")
            .map_err(|e| format!("invalid market close time '{}': {}", close, e))?;

        if open >= close {
            return Err(format!("market open {} is not before close {}", open, close).into());
        }

        Ok(Self::new(open, close))
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        if matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }

        let time = now.time();
        time >= self.open && time < self.close
    }
}

impl Default for TradingCalendar {
    /// 13:30-20:00 UTC, the US cash session
    fn default() -> Self {
        Self::new(
            NaiveTime::from_hms_opt(13, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
        )
    }
}
