//! Collection-time validity.
//!
//! Decides whether a resource should be polled at a given instant.  A
//! camera pointed at the sky is useless at night, so most cameras collect
//! only during [`CollectionSpan::DaylightHours`]; stations usually collect
//! around the clock.
//!
//! All windows are computed on the resource's local calendar day, using its
//! fixed UTC offset.

pub mod sun;

use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Timelike, Utc,
};

use crate::resource::{CollectionSpan, Resource};

use self::sun::SunTimes;

/// Largest accepted daylight widening, in minutes.
pub const MAX_DAYLIGHT_OFFSET_MINUTES: u32 = 60;

/// Returns `true` when `resource` should be polled at `now`.
pub fn is_collection_time(resource: &Resource, now: DateTime<Utc>, daylight_offset_minutes: u32) -> bool {
    if resource.collection == CollectionSpan::FullTime {
        return true;
    }

    let local = local_time(resource, now);
    match collection_window(resource, local.date(), daylight_offset_minutes) {
        Some((start, stop)) => start <= local && local <= stop,
        None => false,
    }
}

/// The local start and stop of collection on `date`, both inclusive.
///
/// `None` when there is nothing to collect that day (polar night for a
/// daylight resource).
pub fn collection_window(
    resource: &Resource,
    date: NaiveDate,
    daylight_offset_minutes: u32,
) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let offset = daylight_offset_minutes.min(MAX_DAYLIGHT_OFFSET_MINUTES) as i64;

    match resource.collection {
        CollectionSpan::FullTime => Some(full_day(date)),
        CollectionSpan::SpecifiedTimes {
            start_hour,
            end_hour,
        } => {
            let start = date.and_time(hour_start(start_hour.min(23)));
            // 08:00 ends at 07:59:59.999; midnight ends the day.
            let last_hour = if end_hour == 0 { 23 } else { (end_hour - 1).min(23) };
            Some((start, date.and_time(hour_end(last_hour))))
        }
        CollectionSpan::DaylightHours => {
            let loc = resource.location;
            let hours = loc.utc_offset_minutes as f64 / 60.0;
            match sun::sun_times(loc.latitude, loc.longitude, date, hours) {
                SunTimes::Normal { sunrise, sunset } => {
                    let mut start = date.and_time(sunrise);
                    if sunrise.hour() > 0 {
                        start -= Duration::minutes(offset);
                    }
                    let mut stop = date.and_time(sunset);
                    if sunset.hour() < 23 {
                        stop += Duration::minutes(offset);
                    }
                    Some((
                        start.date().and_time(hour_start(start.hour())),
                        stop.date().and_time(hour_end(stop.hour())),
                    ))
                }
                SunTimes::MidnightSun => Some(full_day(date)),
                SunTimes::PolarNight => None,
            }
        }
    }
}

fn local_time(resource: &Resource, now: DateTime<Utc>) -> NaiveDateTime {
    let tz = resource
        .location
        .utc_offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix());
    now.with_timezone(&tz).naive_local()
}

fn full_day(date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    (date.and_time(hour_start(0)), date.and_time(hour_end(23)))
}

fn hour_start(hour: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn hour_end(hour: u32) -> NaiveTime {
    NaiveTime::from_hms_milli_opt(hour, 59, 59, 999).unwrap_or(NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{DataFormat, Location, ResourceKind};
    use chrono::TimeZone;

    fn resource(collection: CollectionSpan, location: Location) -> Resource {
        Resource {
            number: 1,
            name: "test".into(),
            active: true,
            frequency_secs: 60,
            format: DataFormat::Jpeg,
            url: "http://example.com/cam.jpg".into(),
            kind: ResourceKind::WeatherCamera,
            collection,
            location,
        }
    }

    fn utc(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 21, h, m, s).unwrap()
    }

    #[test]
    fn full_time_is_always_valid() {
        let r = resource(CollectionSpan::FullTime, Location::default());
        assert!(is_collection_time(&r, utc(0, 0, 0), 60));
        assert!(is_collection_time(&r, utc(23, 59, 59), 60));
    }

    #[test]
    fn specified_times_bounds() {
        let r = resource(
            CollectionSpan::SpecifiedTimes {
                start_hour: 8,
                end_hour: 17,
            },
            Location::default(),
        );

        assert!(!is_collection_time(&r, utc(7, 59, 59), 0));
        assert!(is_collection_time(&r, utc(8, 0, 0), 0));
        assert!(is_collection_time(&r, utc(16, 59, 59), 0));
        assert!(!is_collection_time(&r, utc(17, 0, 0), 0));
    }

    #[test]
    fn specified_end_of_zero_means_midnight() {
        let r = resource(
            CollectionSpan::SpecifiedTimes {
                start_hour: 20,
                end_hour: 0,
            },
            Location::default(),
        );

        assert!(is_collection_time(&r, utc(23, 30, 0), 0));
        assert!(!is_collection_time(&r, utc(19, 0, 0), 0));
    }

    #[test]
    fn specified_times_use_local_offset() {
        let r = resource(
            CollectionSpan::SpecifiedTimes {
                start_hour: 8,
                end_hour: 17,
            },
            Location {
                utc_offset_minutes: -240,
                ..Location::default()
            },
        );

        // 13:00 UTC is 09:00 local.
        assert!(is_collection_time(&r, utc(13, 0, 0), 0));
        // 08:00 UTC is 04:00 local.
        assert!(!is_collection_time(&r, utc(8, 0, 0), 0));
    }

    #[test]
    fn daylight_window_in_pennsylvania() {
        let r = resource(
            CollectionSpan::DaylightHours,
            Location {
                latitude: 41.0,
                longitude: -76.45,
                utc_offset_minutes: -240,
            },
        );

        // Local noon and local 02:00.
        assert!(is_collection_time(&r, utc(16, 0, 0), 60));
        assert!(!is_collection_time(&r, utc(6, 0, 0), 60));

        let date = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
        let (start, stop) = collection_window(&r, date, 60).unwrap();
        // Sunrise ~05:33 less an hour, truncated; sunset ~20:39 plus an hour.
        assert_eq!(start.time(), hour_start(4));
        assert_eq!(stop.time(), hour_end(21));
    }

    #[test]
    fn absurd_offset_falls_back_to_utc() {
        let r = resource(
            CollectionSpan::SpecifiedTimes {
                start_hour: 8,
                end_hour: 17,
            },
            Location {
                utc_offset_minutes: 2_000_000_000,
                ..Location::default()
            },
        );

        assert!(is_collection_time(&r, utc(9, 0, 0), 0));
        assert!(!is_collection_time(&r, utc(20, 0, 0), 0));
    }

    #[test]
    fn polar_night_never_collects() {
        let r = resource(
            CollectionSpan::DaylightHours,
            Location {
                latitude: 80.0,
                longitude: 15.0,
                utc_offset_minutes: 60,
            },
        );
        let noon = Utc.with_ymd_and_hms(2024, 12, 21, 11, 0, 0).unwrap();

        assert!(!is_collection_time(&r, noon, 60));
    }
}
