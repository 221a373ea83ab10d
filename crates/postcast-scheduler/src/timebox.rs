//! Operator-facing time expression parsing.
//!
//! This is the single place timezone arithmetic happens: expressions are
//! interpreted in the configured display timezone and come back as UTC
//! instants. Every other component works in UTC only.
//!
//! Accepted by [`resolve`]:
//! - `now`
//! - relative offsets: `30m`, `2h`, `1d`
//! - `today 18:00`, `tomorrow 9am` (hour as 24h, `H:MM`, or `Ham`/`Hpm`)
//! - `2025-12-31 23:59` (`YYYY-MM-DD HH:MM`)
//! - `12/31 23:59` (`MM/DD HH:MM`, year defaults to the current local year)

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use postcast_core::error::{PostcastError, Result};

/// Resolve a time expression to a UTC instant.
pub fn resolve(expr: &str, now: DateTime<Utc>, tz: Tz) -> Result<DateTime<Utc>> {
    let text = expr.trim().to_lowercase();

    if text == "now" {
        return Ok(now);
    }

    // Relative offsets are timezone-independent.
    if let Some(offset) = parse_offset(&text)? {
        return now.checked_add_signed(offset).ok_or_else(bad_format);
    }

    let now_local = now.with_timezone(&tz).naive_local();

    if let Some(rest) = text.strip_prefix("tomorrow") {
        let rest = rest.trim();
        let midnight = (now_local.date() + Duration::days(1)).and_time(NaiveTime::MIN);
        let local = if rest.is_empty() {
            now_local + Duration::days(1)
        } else {
            midnight + Duration::hours(parse_hour(rest)?)
        };
        return local_to_utc(local, tz);
    }

    if let Some(rest) = text.strip_prefix("today") {
        let rest = rest.trim();
        if !rest.is_empty() {
            let midnight = now_local.date().and_time(NaiveTime::MIN);
            let local = midnight + Duration::hours(parse_hour(rest)?);
            return local_to_utc(local, tz);
        }
        // Bare "today" is a duration, not an instant.
        return Err(bad_format());
    }

    if let Ok(local) = NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M") {
        return local_to_utc(local, tz);
    }

    // MM/DD HH:MM — year defaults to the current display-timezone year.
    if let Some((date_part, time_part)) = text.split_once(' ')
        && let Some((month, day)) = date_part.split_once('/')
        && let (Ok(month), Ok(day)) = (month.parse::<u32>(), day.parse::<u32>())
        && let Ok(time) = NaiveTime::parse_from_str(time_part.trim(), "%H:%M")
        && let Some(date) = NaiveDate::from_ymd_opt(now_local.year(), month, day)
    {
        return local_to_utc(date.and_time(time), tz);
    }

    Err(bad_format())
}

/// Parse a duration expression to whole minutes.
///
/// Accepts `<n>m|h|d` and `today` (minutes remaining until the next local
/// midnight).
pub fn parse_duration_minutes(expr: &str, now: DateTime<Utc>, tz: Tz) -> Result<i64> {
    let text = expr.trim().to_lowercase();

    if text == "today" {
        let now_local = now.with_timezone(&tz).naive_local();
        let midnight = (now_local.date() + Duration::days(1)).and_time(NaiveTime::MIN);
        return Ok((midnight - now_local).num_minutes());
    }

    match parse_offset(&text)? {
        Some(offset) => Ok(offset.num_minutes()),
        None => Err(PostcastError::Format(
            "Invalid duration! Use: 30m, 2h, 1d, or today".into(),
        )),
    }
}

/// `<n>m|h|d` → duration, or None if the suffix does not match.
fn parse_offset(text: &str) -> Result<Option<Duration>> {
    let Some(unit) = text.chars().last() else {
        return Err(bad_format());
    };
    if !matches!(unit, 'm' | 'h' | 'd') {
        return Ok(None);
    }
    let digits = &text[..text.len() - 1];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Ok(None);
    }
    let n: i64 = digits.parse().map_err(|_| bad_format())?;
    // Checked constructors: absurd counts are bad input, not a panic.
    match unit {
        'm' => Duration::try_minutes(n),
        'h' => Duration::try_hours(n),
        _ => Duration::try_days(n),
    }
    .map(Some)
    .ok_or_else(bad_format)
}

/// Parse an hour-of-day: `9am`, `12pm`, `18`, `18:30` (minutes ignored).
fn parse_hour(text: &str) -> Result<i64> {
    let text = text.trim();

    if let Some(stripped) = text.strip_suffix("am").or_else(|| text.strip_suffix("pm")) {
        let hour: i64 = stripped.trim().parse().map_err(|_| bad_format())?;
        if !(1..=12).contains(&hour) {
            return Err(bad_format());
        }
        let is_pm = text.ends_with("pm");
        return Ok(match (is_pm, hour) {
            (true, 12) => 12,
            (true, h) => h + 12,
            (false, 12) => 0,
            (false, h) => h,
        });
    }

    let hour_part = text.split(':').next().unwrap_or(text);
    let hour: i64 = hour_part.parse().map_err(|_| bad_format())?;
    if !(0..=23).contains(&hour) {
        return Err(bad_format());
    }
    Ok(hour)
}

fn local_to_utc(local: NaiveDateTime, tz: Tz) -> Result<DateTime<Utc>> {
    tz.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| PostcastError::Format("time does not exist in display timezone".into()))
}

fn bad_format() -> PostcastError {
    PostcastError::Format(
        "Invalid format! Use: 2025-12-31 23:59 or 12/31 23:59 or tomorrow 9am".into(),
    )
}
