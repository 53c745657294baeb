//! Sunrise and sunset times using the NOAA solar calculation.
//!
//! The results are accurate to a few minutes for latitudes below the polar
//! circles, which is all the daylight window needs.

use chrono::{Datelike, NaiveDate, NaiveTime};

/// Zenith angle of the sun's centre at apparent sunrise, including
/// refraction and the solar disc radius.
const SUNRISE_ZENITH_DEG: f64 = 90.833;

/// Julian day of 1 January 2000, 12:00 UT.
const J2000: f64 = 2_451_545.0;

/// Offset between `num_days_from_ce` and the Julian day at 00:00 UT.
const CE_TO_JULIAN: f64 = 1_721_424.5;

/// Daylight on one local day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SunTimes {
    /// The sun rises and sets; local wall-clock times.
    Normal { sunrise: NaiveTime, sunset: NaiveTime },
    /// The sun stays below the horizon all day.
    PolarNight,
    /// The sun stays above the horizon all day.
    MidnightSun,
}

/// Compute sunrise and sunset for `date` at a location.
///
/// `utc_offset_hours` is the fixed offset of local wall-clock time.
pub fn sun_times(latitude: f64, longitude: f64, date: NaiveDate, utc_offset_hours: f64) -> SunTimes {
    // Local noon of the requested day, as a Julian day.
    let jd = date.num_days_from_ce() as f64 + CE_TO_JULIAN + 0.5 - utc_offset_hours / 24.0;
    let t = (jd - J2000) / 36_525.0;

    let mean_long = (280.46646 + t * (36_000.76983 + t * 0.000_303_2)).rem_euclid(360.0);
    let mean_anom = 357.52911 + t * (35_999.05029 - 0.000_153_7 * t);
    let eccent = 0.016_708_634 - t * (0.000_042_037 + 0.000_000_126_7 * t);

    let m = mean_anom.to_radians();
    let centre = m.sin() * (1.914_602 - t * (0.004_817 + 0.000_014 * t))
        + (2.0 * m).sin() * (0.019_993 - 0.000_101 * t)
        + (3.0 * m).sin() * 0.000_289;

    let omega = (125.04 - 1_934.136 * t).to_radians();
    let apparent_long = (mean_long + centre - 0.005_69 - 0.004_78 * omega.sin()).to_radians();

    let mean_obliq =
        23.0 + (26.0 + (21.448 - t * (46.815 + t * (0.000_59 - t * 0.001_813))) / 60.0) / 60.0;
    let obliq = (mean_obliq + 0.002_56 * omega.cos()).to_radians();

    let declination = (obliq.sin() * apparent_long.sin()).asin();

    let y = (obliq / 2.0).tan().powi(2);
    let l0 = mean_long.to_radians();
    let eq_of_time_min = 4.0
        * (y * (2.0 * l0).sin() - 2.0 * eccent * m.sin()
            + 4.0 * eccent * y * m.sin() * (2.0 * l0).cos()
            - 0.5 * y * y * (4.0 * l0).sin()
            - 1.25 * eccent * eccent * (2.0 * m).sin())
        .to_degrees();

    let lat = latitude.to_radians();
    let cos_hour_angle = SUNRISE_ZENITH_DEG.to_radians().cos() / (lat.cos() * declination.cos())
        - lat.tan() * declination.tan();

    if cos_hour_angle > 1.0 {
        return SunTimes::PolarNight;
    }
    if cos_hour_angle < -1.0 {
        return SunTimes::MidnightSun;
    }

    let hour_angle_deg = cos_hour_angle.acos().to_degrees();
    let solar_noon_min = 720.0 - 4.0 * longitude - eq_of_time_min + utc_offset_hours * 60.0;

    SunTimes::Normal {
        sunrise: minutes_to_time(solar_noon_min - 4.0 * hour_angle_deg),
        sunset: minutes_to_time(solar_noon_min + 4.0 * hour_angle_deg),
    }
}

/// Minutes after local midnight, clamped into the day.
fn minutes_to_time(minutes: f64) -> NaiveTime {
    let secs = (minutes * 60.0).round().clamp(0.0, 86_399.0) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, 0).unwrap_or(NaiveTime::MIN)
}
