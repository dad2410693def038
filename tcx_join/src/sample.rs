use chrono::{DateTime, NaiveDateTime, Utc};

use crate::TcxError;

/// Latitude/longitude pair in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Position {
    pub latitude_degrees: f64,
    pub longitude_degrees: f64,
}

impl Position {
    pub fn new(latitude_degrees: f64, longitude_degrees: f64) -> Self {
        Self {
            latitude_degrees,
            longitude_degrees,
        }
    }
}

/// A metric value with a visible slot and a staged (hidden) slot.
///
/// Interpolated values are staged first and only become visible on
/// [`MetricSlot::commit`], so a fill computed for one sample is never read
/// while computing another.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricSlot<T> {
    visible: Option<T>,
    hidden: Option<T>,
}

impl<T> Default for MetricSlot<T> {
    fn default() -> Self {
        Self {
            visible: None,
            hidden: None,
        }
    }
}

impl<T> MetricSlot<T> {
    pub fn new(value: Option<T>) -> Self {
        Self {
            visible: value,
            hidden: None,
        }
    }

    pub fn get(&self) -> Option<&T> {
        self.visible.as_ref()
    }

    pub fn is_present(&self) -> bool {
        self.visible.is_some()
    }

    pub fn staged(&self) -> Option<&T> {
        self.hidden.as_ref()
    }

    pub fn stage(&mut self, value: T) {
        self.hidden = Some(value);
    }

    /// Promote the staged value if nothing is visible yet. Idempotent.
    pub fn commit(&mut self) {
        if self.visible.is_none() {
            self.visible = self.hidden.take();
        } else {
            self.hidden = None;
        }
    }
}

/// One recorded instant of an activity track.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    time: DateTime<Utc>,
    pub position: MetricSlot<Position>,
    pub distance_meters: MetricSlot<f64>,
    pub heart_rate_bpm: MetricSlot<u16>,
    // Carried through untouched.
    pub altitude_meters: Option<f64>,
    pub cadence: Option<u8>,
}

impl Sample {
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time,
            position: MetricSlot::default(),
            distance_meters: MetricSlot::default(),
            heart_rate_bpm: MetricSlot::default(),
            altitude_meters: None,
            cadence: None,
        }
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn with_position(mut self, latitude: f64, longitude: f64) -> Self {
        self.position = MetricSlot::new(Some(Position::new(latitude, longitude)));
        self
    }

    pub fn with_distance(mut self, meters: f64) -> Self {
        self.distance_meters = MetricSlot::new(Some(meters));
        self
    }

    pub fn with_heart_rate(mut self, bpm: u16) -> Self {
        self.heart_rate_bpm = MetricSlot::new(Some(bpm));
        self
    }
}

/// Parse a trackpoint timestamp. Offset-less values are read as UTC.
pub fn parse_time(raw: &str) -> Result<DateTime<Utc>, TcxError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| TcxError::UnparseableTimestamp(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_time_formats() {
        let expected = Utc.with_ymd_and_hms(2016, 3, 5, 9, 30, 12).unwrap();
        assert_eq!(parse_time("2016-03-05T09:30:12Z").unwrap(), expected);
        assert_eq!(parse_time("2016-03-05T09:30:12.000Z").unwrap(), expected);
        assert_eq!(parse_time("2016-03-05T10:30:12+01:00").unwrap(), expected);
        assert_eq!(parse_time(" 2016-03-05T09:30:12 ").unwrap(), expected);
    }

    #[test]
    fn test_parse_time_rejects_garbage() {
        let err = parse_time("yesterday-ish").unwrap_err();
        assert!(matches!(err, TcxError::UnparseableTimestamp(ref s) if s == "yesterday-ish"));
    }

    #[test]
    fn test_commit_promotes_staged_value() {
        let mut slot: MetricSlot<f64> = MetricSlot::default();
        slot.stage(12.5);
        assert!(!slot.is_present());
        slot.commit();
        assert_eq!(slot.get(), Some(&12.5));
        assert_eq!(slot.staged(), None);
    }

    #[test]
    fn test_commit_is_idempotent() {
        let mut slot: MetricSlot<u16> = MetricSlot::default();
        slot.stage(140);
        slot.commit();
        let once = slot.clone();
        slot.commit();
        assert_eq!(slot, once);

        let mut empty: MetricSlot<u16> = MetricSlot::default();
        empty.commit();
        empty.commit();
        assert_eq!(empty, MetricSlot::default());
    }

    #[test]
    fn test_commit_keeps_visible_value() {
        let mut slot = MetricSlot::new(Some(3.0));
        slot.stage(9.0);
        slot.commit();
        assert_eq!(slot.get(), Some(&3.0));
        assert_eq!(slot.staged(), None);
    }
}
