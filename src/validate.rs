use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};

/// Longest accepted lead time: one week.
pub const MAX_REMINDER_MINUTES: u32 = 7 * 24 * 60;

/// Lead times offered in listings and help text.
pub const REMINDER_PRESETS: [u32; 8] = [5, 10, 15, 30, 60, 120, 180, 1440];

pub fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        bail!("title must not be empty");
    }
    Ok(())
}

pub fn validate_color(color: &str) -> Result<()> {
    if color.is_empty() || !color.chars().all(|c| c.is_ascii_alphanumeric() || c == '#') {
        bail!("color '{color}' must be a name or #hex value");
    }
    Ok(())
}

pub fn validate_reminder_minutes(minutes: u32) -> Result<()> {
    if minutes > MAX_REMINDER_MINUTES {
        bail!("reminder lead time of {minutes} minutes exceeds the maximum of {MAX_REMINDER_MINUTES}");
    }
    Ok(())
}

/// Parse a wall-clock time such as `7:30` or `21:05`.
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .with_context(|| format!("invalid time '{s}': expected HH:MM"))
}

/// Parse a due date.
///
/// Accepts RFC 3339 (`2026-05-01T09:00:00Z`), local `YYYY-MM-DD HH:MM`, or an
/// offset from `now` such as `+45m`, `+2h`, `+1d`.
pub fn parse_due_date<Tz: TimeZone>(s: &str, now: DateTime<Tz>) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Some(offset) = s.strip_prefix('+') {
        return Ok(now.with_timezone(&Utc) + parse_offset(offset)?);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            let local = now
                .timezone()
                .from_local_datetime(&naive)
                .earliest()
                .with_context(|| format!("'{s}' does not exist in the local time zone"))?;
            return Ok(local.with_timezone(&Utc));
        }
    }
    bail!("invalid due date '{s}': expected YYYY-MM-DD HH:MM, RFC 3339, or +N[m|h|d]")
}

fn parse_offset(s: &str) -> Result<TimeDelta> {
    let split = s.char_indices().last().map_or(0, |(i, _)| i);
    let (digits, unit) = s.split_at(split);
    let n: i64 = digits
        .parse()
        .with_context(|| format!("invalid offset '+{s}'"))?;
    match unit {
        "m" => Ok(TimeDelta::minutes(n)),
        "h" => Ok(TimeDelta::hours(n)),
        "d" => Ok(TimeDelta::days(n)),
        _ => bail!("invalid offset unit in '+{s}': use m, h, or d"),
    }
}
