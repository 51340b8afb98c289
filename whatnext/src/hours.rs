//! Opening-hours evaluation.
//!
//! Hours are stored per weekday as a two element `["HHMM", "HHMM"]` pair.
//! A close time at or before the open time means the business closes after
//! midnight, so the window is extended into the next day.

use chrono::{Duration, NaiveDateTime, NaiveTime};

/// Returns true when `now` falls inside the open window described by `hours`.
///
/// Absent, wrongly sized or unparsable hours are treated as closed.
pub fn is_open<S: AsRef<str>>(now: NaiveDateTime, hours: Option<&[S]>) -> bool {
    let Some(pair) = hours else {
        return false;
    };
    let [open_str, close_str] = pair else {
        return false;
    };
    let (Some(open_time), Some(close_time)) =
        (parse_hhmm(open_str.as_ref()), parse_hhmm(close_str.as_ref()))
    else {
        return false;
    };

    let open = now.date().and_time(open_time);
    let mut close = now.date().and_time(close_time);
    if close <= open {
        close += Duration::days(1);
    }

    open <= now && now <= close
}

fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hour: u32 = s[..2].parse().ok()?;
    let minute: u32 = s[2..].parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}
