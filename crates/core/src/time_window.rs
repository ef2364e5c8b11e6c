use chrono::{FixedOffset, Local, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};

use crate::error::CoreError;

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Zone in which date and date-time bounds are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Local,
    Fixed(FixedOffset),
}

impl Zone {
    pub fn utc() -> Self {
        Self::Fixed(Utc.fix())
    }

    /// Render epoch seconds as wall-clock time in this zone.
    pub fn format(&self, ts: i64, fmt: &str) -> Option<String> {
        match self {
            Self::Local => Local
                .timestamp_opt(ts, 0)
                .single()
                .map(|dt| dt.format(fmt).to_string()),
            Self::Fixed(offset) => offset
                .timestamp_opt(ts, 0)
                .single()
                .map(|dt| dt.format(fmt).to_string()),
        }
    }

    fn to_epoch(&self, naive: NaiveDateTime) -> Option<i64> {
        match self {
            Self::Local => Local.from_local_datetime(&naive).earliest().map(|dt| dt.timestamp()),
            Self::Fixed(offset) => offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.timestamp()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundSide {
    Start,
    End,
}

/// Inclusive creation-time window in epoch seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl TimeWindow {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn between(start: i64, end: i64) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Parse textual bounds. Empty or missing bounds leave that side open.
    pub fn parse(start: Option<&str>, end: Option<&str>, zone: Zone) -> Result<Self, CoreError> {
        let start = match start.map(str::trim).filter(|s| !s.is_empty()) {
            Some(value) => Some(parse_bound(value, BoundSide::Start, zone)?),
            None => None,
        };
        let end = match end.map(str::trim).filter(|s| !s.is_empty()) {
            Some(value) => Some(parse_bound(value, BoundSide::End, zone)?),
            None => None,
        };
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(CoreError::InvalidTimeRange {
                    value: format!("{s}..{e}"),
                    reason: "start is after end".into(),
                });
            }
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, ts: i64) -> bool {
        self.start.is_none_or(|s| ts >= s) && self.end.is_none_or(|e| ts <= e)
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Normalize one bound to epoch seconds.
///
/// Accepts an integer timestamp, `YYYY-MM-DD HH:MM:SS`, or `YYYY-MM-DD`. A bare date
/// covers the whole day: start bounds begin at 00:00:00, end bounds stop at 23:59:59.
pub fn parse_bound(value: &str, side: BoundSide, zone: Zone) -> Result<i64, CoreError> {
    let value = value.trim();
    let invalid = |reason: &str| CoreError::InvalidTimeRange {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    if let Ok(ts) = value.parse::<i64>() {
        return Ok(ts);
    }

    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return zone
                .to_epoch(naive)
                .ok_or_else(|| invalid("time does not exist in the configured zone"));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, DATE_FORMAT) {
        let naive = match side {
            BoundSide::Start => date.and_hms_opt(0, 0, 0),
            BoundSide::End => date.and_hms_opt(23, 59, 59),
        }
        .ok_or_else(|| invalid("date out of range"))?;
        return zone
            .to_epoch(naive)
            .ok_or_else(|| invalid("time does not exist in the configured zone"));
    }

    Err(invalid(
        "expected a timestamp, 'YYYY-MM-DD' or 'YYYY-MM-DD HH:MM:SS'",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2025-01-05 00:00:00 UTC
    const JAN_5: i64 = 1_736_035_200;
    const DAY: i64 = 86_400;

    #[test]
    fn date_bounds_cover_whole_days() {
        let window = TimeWindow::parse(Some("2025-01-05"), Some("2025-01-06"), Zone::utc()).unwrap();
        assert_eq!(window.start, Some(JAN_5));
        assert_eq!(window.end, Some(JAN_5 + 2 * DAY - 1));
        assert!(!window.contains(JAN_5 - 1));
        assert!(window.contains(JAN_5 + DAY + 12 * 3600));
        assert!(!window.contains(JAN_5 + 2 * DAY));
    }

    #[test]
    fn datetime_and_timestamp_forms() {
        let zone = Zone::utc();
        assert_eq!(
            parse_bound("2025-01-05 08:30:00", BoundSide::End, zone).unwrap(),
            JAN_5 + 8 * 3600 + 1800
        );
        assert_eq!(parse_bound("1736035200", BoundSide::Start, zone).unwrap(), JAN_5);
    }

    #[test]
    fn fixed_offset_shifts_bounds() {
        let zone = Zone::Fixed(FixedOffset::east_opt(8 * 3600).unwrap());
        assert_eq!(
            parse_bound("2025-01-05", BoundSide::Start, zone).unwrap(),
            JAN_5 - 8 * 3600
        );
    }

    #[test]
    fn invalid_forms_report_value() {
        let err = TimeWindow::parse(Some("05/01/2025"), None, Zone::utc()).unwrap_err();
        match err {
            CoreError::InvalidTimeRange { value, .. } => assert_eq!(value, "05/01/2025"),
            other => panic!("expected InvalidTimeRange, got {other:?}"),
        }
        assert!(TimeWindow::parse(Some("2025-02-30"), None, Zone::utc()).is_err());
    }

    #[test]
    fn reversed_window_rejected() {
        assert!(TimeWindow::parse(Some("2025-01-06"), Some("2025-01-05"), Zone::utc()).is_err());
    }

    #[test]
    fn zone_formats_wall_clock() {
        let zone = Zone::Fixed(FixedOffset::east_opt(3600).unwrap());
        assert_eq!(
            zone.format(JAN_5, "%Y-%m-%d %H:%M:%S").as_deref(),
            Some("2025-01-05 01:00:00")
        );
    }

    #[test]
    fn empty_bounds_are_open() {
        let window = TimeWindow::parse(Some(""), None, Zone::utc()).unwrap();
        assert!(window.is_unbounded());
        assert!(window.contains(i64::MIN));
    }
}
