//! Timestamps
//!
//! Records carry a `TimeUS` field with microseconds since boot. Wall-clock
//! time is only available from GPS records, as GPS week and milliseconds of
//! week.

use chrono::{
    DateTime,
    NaiveDate,
    TimeDelta,
    Utc,
};

use crate::{
    log::Log,
    value::Column,
};

/// Unix timestamp of the GPS epoch, 1980-01-06.
pub const GPS_EPOCH_UNIX: i64 = 315_964_800;

const MILLISECONDS_PER_WEEK: i64 = 7 * 24 * 60 * 60 * 1000;

/// Offset between TAI and GPS time.
const GPS_TAI_OFFSET: i64 = 19;

/// TAI - UTC, from the first day of the given month.
const LEAP_SECONDS: &[(i32, u32, i64)] = &[
    (1996, 1, 30),
    (1997, 7, 31),
    (1999, 1, 32),
    (2006, 1, 33),
    (2009, 1, 34),
    (2012, 7, 35),
    (2015, 7, 36),
    (2017, 1, 37),
];

/// TAI - UTC before the first entry of the table.
const LEAP_SECONDS_BEFORE: i64 = 29;

/// Converts a column of `TimeUS` values to seconds.
pub fn time_us_to_seconds(column: &Column) -> Option<Vec<f64>> {
    let mut values = column.to_f64()?;
    for value in &mut values {
        *value *= 1e-6;
    }
    Some(values)
}

/// Difference between TAI and UTC in seconds at `time`.
pub fn leap_seconds_tai(time: DateTime<Utc>) -> i64 {
    let date = time.date_naive();
    LEAP_SECONDS
        .iter()
        .rev()
        .find(|(year, month, _)| {
            NaiveDate::from_ymd_opt(*year, *month, 1).is_some_and(|start| date >= start)
        })
        .map_or(LEAP_SECONDS_BEFORE, |(_, _, seconds)| *seconds)
}

/// Difference between GPS time and UTC in seconds at `time`.
pub fn leap_seconds_gps(time: DateTime<Utc>) -> i64 {
    leap_seconds_tai(time) - GPS_TAI_OFFSET
}

/// Converts GPS week and milliseconds of week to UTC.
pub fn gps_time_to_utc(week: u64, milliseconds: u64) -> Option<DateTime<Utc>> {
    let week = i64::try_from(week).ok()?;
    let milliseconds = i64::try_from(milliseconds).ok()?;
    let gps_milliseconds = week
        .checked_mul(MILLISECONDS_PER_WEEK)?
        .checked_add(milliseconds)?
        .checked_add(GPS_EPOCH_UNIX * 1000)?;

    let gps_time = DateTime::from_timestamp_millis(gps_milliseconds)?;
    gps_time.checked_sub_signed(TimeDelta::seconds(leap_seconds_gps(gps_time)))
}

impl Log {
    /// Wall-clock time of the first `GPS` record with a valid week number.
    ///
    /// For multiple GPS instances, the first instance is used.
    pub fn extract_start_time(&self) -> Option<DateTime<Utc>> {
        let table = self.table("GPS").ok()?;
        let weeks = table.column("GWk")?;
        let milliseconds = table.column("GMS")?;

        (0..table.len()).find_map(|index| {
            let week = weeks.get(index)?.as_u64()?;
            if week <= 1000 {
                return None;
            }
            gps_time_to_utc(week, milliseconds.get(index)?.as_u64()?)
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{
        DateTime,
        Utc,
    };

    use crate::{
        log::Log,
        time::{
            gps_time_to_utc,
            leap_seconds_gps,
            time_us_to_seconds,
        },
        value::{
            Column,
            Value,
        },
        writer::LogWriter,
    };

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn it_knows_leap_seconds() {
        assert_eq!(leap_seconds_gps(utc("2016-12-31T23:00:00Z")), 17);
        assert_eq!(leap_seconds_gps(utc("2017-01-01T00:00:00Z")), 18);
        assert_eq!(leap_seconds_gps(utc("2024-06-01T00:00:00Z")), 18);
        assert_eq!(leap_seconds_gps(utc("2010-01-01T00:00:00Z")), 15);
    }

    #[test]
    fn it_converts_gps_time() {
        assert_eq!(
            gps_time_to_utc(2200, 0).unwrap(),
            utc("2022-03-05T23:59:42Z")
        );
        assert_eq!(
            gps_time_to_utc(2200, 1500).unwrap(),
            utc("2022-03-05T23:59:43.500Z")
        );
    }

    #[test]
    fn it_converts_microseconds() {
        let seconds = time_us_to_seconds(&Column::UInt(vec![0, 1_500_000])).unwrap();
        assert_eq!(seconds, [0.0, 1.5]);
        assert!(time_us_to_seconds(&Column::Text(vec![])).is_none());
    }

    #[test]
    fn it_extracts_the_start_time() {
        let mut writer = LogWriter::new();
        writer
            .write_format(0x81, "GPS", "QBIH", "TimeUS,Status,GMS,GWk")
            .unwrap();
        for (week, ms) in [(0, 0), (2200, 0), (2200, 200)] {
            writer
                .write_record(
                    0x81,
                    &[
                        Value::UInt(1),
                        Value::UInt(3),
                        Value::UInt(ms),
                        Value::UInt(week),
                    ],
                )
                .unwrap();
        }

        let log = Log::parse(&writer.into_bytes()).unwrap();
        assert_eq!(log.extract_start_time(), Some(utc("2022-03-05T23:59:42Z")));
    }

    #[test]
    fn it_has_no_start_time_without_gps() {
        let mut writer = LogWriter::new();
        writer.write_format(0x81, "TST", "Q", "TimeUS").unwrap();
        writer.write_record(0x81, &[Value::UInt(1)]).unwrap();
        let log = Log::parse(&writer.into_bytes()).unwrap();
        assert_eq!(log.extract_start_time(), None);
    }
}
