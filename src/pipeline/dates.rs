//! Resolves the date expressions people write in expense notes ("yesterday", "2/17", "Feb 17",
//! "3 days ago", "last monday") against an explicit reference date.
//!
//! Nothing here reads the clock. The result is used as a hint in the normalization prompt.

use chrono::{Datelike, Days, NaiveDate, Weekday};

/// Resolves `expr` to a calendar date relative to `reference`, or `None` if it is not a form we
/// recognize. A date without a year gets the reference year. A bare weekday means the most recent
/// such day on or before `reference`. `last <weekday>` is strictly before it.
pub fn resolve_date(expr: &str, reference: NaiveDate) -> Option<NaiveDate> {
    let normalized = expr
        .trim()
        .trim_end_matches('.')
        .to_lowercase()
        .replace(',', " ");
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    match tokens.as_slice() {
        [] => None,
        ["today"] | ["now"] => Some(reference),
        ["yesterday"] => reference.checked_sub_days(Days::new(1)),
        ["tomorrow"] => reference.checked_add_days(Days::new(1)),
        ["day", "before", "yesterday"] | ["the", "day", "before", "yesterday"] => {
            reference.checked_sub_days(Days::new(2))
        }
        ["last", "week"] | ["a", "week", "ago"] => reference.checked_sub_days(Days::new(7)),
        [n, unit, "ago"] => {
            let n = parse_count(n)?;
            let days = match *unit {
                "day" | "days" => n,
                "week" | "weeks" => n.checked_mul(7)?,
                _ => return None,
            };
            reference.checked_sub_days(Days::new(days))
        }
        [day] => parse_weekday(day)
            .map(|w| weekday_on_or_before(reference, w))
            .or_else(|| parse_iso(day))
            .or_else(|| parse_numeric(day, reference)),
        ["last", day] => {
            let w = parse_weekday(day)?;
            let yesterday = reference.checked_sub_days(Days::new(1))?;
            Some(weekday_on_or_before(yesterday, w))
        }
        ["this", day] | ["on", day] => parse_weekday(day).map(|w| weekday_on_or_before(reference, w)),
        [a, b] => parse_month_day(a, b, None, reference),
        [a, b, year] => parse_month_day(a, b, Some(year), reference),
        _ => None,
    }
}

fn parse_count(s: &str) -> Option<u64> {
    let n = match s {
        "a" | "an" | "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        _ => s.parse().ok()?,
    };
    Some(n)
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    let w = match s {
        "monday" | "mon" => Weekday::Mon,
        "tuesday" | "tue" | "tues" => Weekday::Tue,
        "wednesday" | "wed" => Weekday::Wed,
        "thursday" | "thu" | "thur" | "thurs" => Weekday::Thu,
        "friday" | "fri" => Weekday::Fri,
        "saturday" | "sat" => Weekday::Sat,
        "sunday" | "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(w)
}

fn weekday_on_or_before(date: NaiveDate, weekday: Weekday) -> NaiveDate {
    let back = (7 + date.weekday().num_days_from_monday() - weekday.num_days_from_monday()) % 7;
    date - Days::new(u64::from(back))
}

fn parse_iso(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// `M/D`, `M/D/YY` or `M/D/YYYY`. Dashes are accepted in place of slashes.
fn parse_numeric(s: &str, reference: NaiveDate) -> Option<NaiveDate> {
    let parts: Vec<&str> = s.split(['/', '-']).collect();
    let (month, day, year) = match parts.as_slice() {
        [m, d] => (m, d, None),
        [m, d, y] => (m, d, Some(*y)),
        _ => return None,
    };
    let month: u32 = month.parse().ok()?;
    let day: u32 = day.parse().ok()?;
    let year = match year {
        None => reference.year(),
        Some(y) => parse_year(y)?,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// `Feb 17`, `February 17th`, `17 Feb`, each with an optional year.
fn parse_month_day(
    a: &str,
    b: &str,
    year: Option<&str>,
    reference: NaiveDate,
) -> Option<NaiveDate> {
    let (month, day) = match (parse_month(a), parse_month(b)) {
        (Some(m), None) => (m, parse_day(b)?),
        (None, Some(m)) => (m, parse_day(a)?),
        _ => return None,
    };
    let year = match year {
        None => reference.year(),
        Some(y) => parse_year(y)?,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_month(s: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    if s.len() < 3 {
        return None;
    }
    let s = s.trim_end_matches('.');
    MONTHS
        .iter()
        .position(|m| *m == s || (s.len() <= 4 && m.starts_with(s)))
        .map(|i| i as u32 + 1)
}

fn parse_day(s: &str) -> Option<u32> {
    let digits = s
        .strip_suffix("st")
        .or_else(|| s.strip_suffix("nd"))
        .or_else(|| s.strip_suffix("rd"))
        .or_else(|| s.strip_suffix("th"))
        .unwrap_or(s);
    digits.parse().ok()
}

fn parse_year(s: &str) -> Option<i32> {
    let y: i32 = s.parse().ok()?;
    match s.len() {
        2 => Some(2000 + y),
        4 => Some(y),
        _ => None,
    }
}
