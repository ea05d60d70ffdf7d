use std::sync::OnceLock;

use anyhow::{Context, anyhow};
use chrono::{Datelike, Days, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use regex::Regex;

use crate::config::Config;

pub const TIMEZONE_ENV_VAR: &str = "TASKDECK_TIMEZONE";

/// Resolves the timezone that defines "today": env var, then the
/// `timezone` config key, then UTC.
pub fn resolve_timezone(cfg: &Config) -> Tz {
    if let Ok(raw) = std::env::var(TIMEZONE_ENV_VAR)
        && let Some(tz) = parse_timezone(&raw, TIMEZONE_ENV_VAR)
    {
        return tz;
    }

    if let Some(raw) = cfg.get("timezone")
        && let Some(tz) = parse_timezone(&raw, "config")
    {
        return tz;
    }

    chrono_tz::UTC
}

#[must_use]
pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

fn parse_timezone(raw: &str, source: &str) -> Option<Tz> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        tracing::warn!(source, "timezone source was empty");
        return None;
    }

    match trimmed.parse::<Tz>() {
        Ok(tz) => {
            tracing::debug!(source, timezone = %trimmed, "configured timezone");
            Some(tz)
        }
        Err(err) => {
            tracing::error!(
                source,
                timezone = %trimmed,
                error = %err,
                "failed to parse timezone id"
            );
            None
        }
    }
}

fn relative_re() -> anyhow::Result<&'static Regex> {
    static RELATIVE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    RELATIVE
        .get_or_init(|| Regex::new(r"^\+(?P<num>\d+)(?P<unit>[dw]?)$"))
        .as_ref()
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))
}

/// Parses a due-date expression relative to `today`.
///
/// Accepts `today`, `tomorrow`, `yesterday`, `+N`, `+Nd`, `+Nw`, weekday
/// names (next occurrence strictly after today) and ISO `YYYY-MM-DD`.
#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_due_date(input: &str, today: NaiveDate) -> anyhow::Result<NaiveDate> {
    let token = input.trim();
    let lower = token.to_ascii_lowercase();

    match lower.as_str() {
        "" => return Err(anyhow!("due date is empty")),
        "today" => return Ok(today),
        "tomorrow" => return add_days(today, 1),
        "yesterday" => {
            return today
                .checked_sub_days(Days::new(1))
                .ok_or_else(|| anyhow!("date out of range"));
        }
        _ => {}
    }

    if let Some(caps) = relative_re()?.captures(&lower) {
        let num: u64 = caps
            .name("num")
            .map(|m| m.as_str())
            .ok_or_else(|| anyhow!("missing relative amount"))?
            .parse()
            .context("invalid relative number")?;
        let unit = caps.name("unit").map(|m| m.as_str()).unwrap_or_default();
        let days = match unit {
            "" | "d" => num,
            "w" => num.saturating_mul(7),
            other => return Err(anyhow!("unknown relative unit: {other}")),
        };
        return add_days(today, days);
    }

    if let Some(weekday) = parse_weekday_name(&lower) {
        return Ok(next_weekday_date(today, weekday));
    }

    NaiveDate::parse_from_str(token, "%Y-%m-%d")
        .with_context(|| format!("unrecognized due date: {token} (expected YYYY-MM-DD)"))
}

fn add_days(from: NaiveDate, days: u64) -> anyhow::Result<NaiveDate> {
    from.checked_add_days(Days::new(days))
        .ok_or_else(|| anyhow!("date out of range"))
}

fn parse_weekday_name(token: &str) -> Option<Weekday> {
    match token {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" | "tues" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" | "thur" | "thurs" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

fn next_weekday_date(from: NaiveDate, target: Weekday) -> NaiveDate {
    let from_idx = u64::from(from.weekday().num_days_from_monday());
    let target_idx = u64::from(target.num_days_from_monday());
    let mut delta = (7 + target_idx - from_idx) % 7;
    if delta == 0 {
        delta = 7;
    }
    from.checked_add_days(Days::new(delta)).unwrap_or(from)
}
