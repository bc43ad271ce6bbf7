//! Local-date / UTC-instant boundary helpers.
//!
//! The server stores instants, not calendar dates. Which viewer-local day an
//! entry belongs to is always recomputed from the current process time zone,
//! so the same entry can move between calendar days when the viewer moves
//! zones. These helpers are the single place that conversion happens.

use chrono::{DateTime, Duration, Local, LocalResult, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};

/// Interpret `date` + `time` as wall-clock time in the process time zone and
/// return the equivalent UTC instant.
///
/// Ambiguous wall-clock times (DST fall-back) resolve to the earlier instant.
/// Nonexistent times (DST spring-forward gap) roll forward until a valid
/// local time is found.
pub fn local_date_to_utc_instant(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive = date.and_time(time);
    let local = match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earlier, _) => earlier,
        LocalResult::None => {
            let mut probe = naive + Duration::minutes(30);
            loop {
                match Local.from_local_datetime(&probe) {
                    LocalResult::Single(dt) => break dt,
                    LocalResult::Ambiguous(earlier, _) => break earlier,
                    LocalResult::None => probe += Duration::minutes(30),
                }
            }
        }
    };
    local.with_timezone(&Utc)
}

/// UTC instant for local midnight of `date`.
pub fn local_midnight_as_utc(date: NaiveDate) -> DateTime<Utc> {
    local_date_to_utc_instant(date, NaiveTime::MIN)
}

/// Calendar date (`YYYY-MM-DD` numbering) of `instant` in the process
/// time zone.
pub fn utc_instant_to_local_date(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&Local).date_naive()
}

/// UTC bounds of one viewer-local calendar day: `[00:00:00, 23:59:59.999]`.
///
/// Used to query all entries whose stored instant falls within `date` as the
/// viewer currently sees it.
pub fn local_day_range_as_utc(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
    (
        local_midnight_as_utc(date),
        local_date_to_utc_instant(date, end_of_day),
    )
}

/// Format an instant the way the API expects it (`2026-08-29T15:00:00.000Z`).
pub fn to_wire(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}
