use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

/// Datetime of an observation, with or without an offset.
///
/// A naive value carries no zone; it is always interpreted as UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointTime {
    Naive(NaiveDateTime),
    Zoned(DateTime<FixedOffset>),
}

impl PointTime {
    pub fn to_utc(self) -> DateTime<Utc> {
        match self {
            PointTime::Naive(dt) => dt.and_utc(),
            PointTime::Zoned(dt) => dt.with_timezone(&Utc),
        }
    }
}

/// A single timestamped observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub datetime: PointTime,
    pub value: f64,
}

impl Point {
    pub fn new(datetime: PointTime, value: f64) -> Self {
        Self { datetime, value }
    }

    pub fn naive(datetime: NaiveDateTime, value: f64) -> Self {
        Self::new(PointTime::Naive(datetime), value)
    }

    pub fn zoned(datetime: DateTime<FixedOffset>, value: f64) -> Self {
        Self::new(PointTime::Zoned(datetime), value)
    }

    /// Unix epoch seconds
    pub fn timestamp(&self) -> i64 {
        self.datetime.to_utc().timestamp()
    }

    /// Same observation with its datetime expressed in UTC
    pub fn to_utc(&self) -> Point {
        let utc = self.datetime.to_utc().fixed_offset();
        Point::zoned(utc, self.value)
    }

    /// `(timestamp, value)` as stored under a series' `points` document
    pub fn as_raw_tuple(&self) -> (i64, f64) {
        (self.timestamp(), self.value)
    }
}
