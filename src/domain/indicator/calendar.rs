//! Calendar fields and lunar cycle values of a bar's timestamp (UTC).

use chrono::{DateTime, Datelike, Timelike, Utc};
use std::f64::consts::TAU;

/// Mean length of the synodic month, in days.
pub const SYNODIC_MONTH_DAYS: f64 = 29.530588853;

/// New moon of 2000-01-06 18:14 UTC.
const REFERENCE_NEW_MOON: i64 = 947_182_440;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TimeField {
    Hour,
    Minute,
    /// Monday = 1 through Sunday = 7.
    DayOfWeek,
    DayOfMonth,
    Month,
    Year,
    /// Unix seconds.
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AstroField {
    /// Fraction of the synodic cycle: 0 new, 0.5 full, approaching 1.
    MoonPhase,
    /// Illuminated fraction of the disc, 0 to 1.
    MoonIllumination,
}

pub fn time_field(ts: DateTime<Utc>, field: TimeField) -> f64 {
    match field {
        TimeField::Hour => ts.hour() as f64,
        TimeField::Minute => ts.minute() as f64,
        TimeField::DayOfWeek => ts.weekday().number_from_monday() as f64,
        TimeField::DayOfMonth => ts.day() as f64,
        TimeField::Month => ts.month() as f64,
        TimeField::Year => ts.year() as f64,
        TimeField::Timestamp => ts.timestamp() as f64,
    }
}

pub fn moon_phase(ts: DateTime<Utc>) -> f64 {
    let days = (ts.timestamp() - REFERENCE_NEW_MOON) as f64 / 86_400.0;
    (days / SYNODIC_MONTH_DAYS).rem_euclid(1.0)
}

pub fn moon_illumination(ts: DateTime<Utc>) -> f64 {
    (1.0 - (TAU * moon_phase(ts)).cos()) / 2.0
}

pub fn astro_field(ts: DateTime<Utc>, field: AstroField) -> f64 {
    match field {
        AstroField::MoonPhase => moon_phase(ts),
        AstroField::MoonIllumination => moon_illumination(ts),
    }
}
