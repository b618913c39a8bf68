//! Start/end normalisation into the event's own timezone

use calsync_domain::EventDateTime;
use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;

/// Render an event instant as RFC 3339 in the event's timezone.
///
/// `dt.time_zone` wins over `fallback_tz`. Without a parseable zone a
/// timestamp keeps its own offset and an all-day date is taken as UTC
/// midnight. Returns `None` when the instant itself cannot be parsed.
pub fn normalize_instant(dt: &EventDateTime, fallback_tz: Option<&str>) -> Option<String> {
    let zone = dt.timezone().or(fallback_tz).and_then(|name| name.parse::<Tz>().ok());

    if let Some(raw) = dt.date_time.as_deref() {
        let parsed = DateTime::parse_from_rfc3339(raw).ok()?;
        let rendered = match zone {
            Some(tz) => parsed.with_timezone(&tz).to_rfc3339_opts(SecondsFormat::Secs, false),
            None => parsed.to_rfc3339_opts(SecondsFormat::Secs, false),
        };
        return Some(rendered);
    }

    let date = NaiveDate::parse_from_str(dt.date.as_deref()?, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    match zone {
        Some(tz) => tz
            .from_local_datetime(&midnight)
            .earliest()
            .map(|local| local.to_rfc3339_opts(SecondsFormat::Secs, false)),
        None => Some(Utc.from_utc_datetime(&midnight).to_rfc3339_opts(SecondsFormat::Secs, true)),
    }
}
