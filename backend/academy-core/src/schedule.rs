// src/schedule.rs
use chrono::{NaiveTime, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// `HH:MM-HH:MM`, also accepting `~` as the separator.
static TIME_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2}):(\d{2})\s*[-~]\s*(\d{1,2}):(\d{2})")
        .expect("time range pattern is valid")
});

static DAY_SEPARATORS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[,\s·/]+").expect("day separator pattern is valid")
});

// --- Schedule Window ---

/// Days and time-of-day of one recurring weekly block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleWindow {
    /// Distinct days, Monday first.
    pub days: Vec<Weekday>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl ScheduleWindow {
    pub fn shares_day_with(&self, other: &ScheduleWindow) -> bool {
        self.days.iter().any(|day| other.days.contains(day))
    }

    /// Touching ranges (`end == other.start`) do not overlap.
    pub fn overlaps_time_with(&self, other: &ScheduleWindow) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }

    pub fn collides_with(&self, other: &ScheduleWindow) -> bool {
        self.shares_day_with(other) && self.overlaps_time_with(other)
    }
}

// --- Parsing ---

fn single_char_weekday(c: char) -> Option<Weekday> {
    match c {
        '월' => Some(Weekday::Mon),
        '화' => Some(Weekday::Tue),
        '수' => Some(Weekday::Wed),
        '목' => Some(Weekday::Thu),
        '금' => Some(Weekday::Fri),
        '토' => Some(Weekday::Sat),
        '일' => Some(Weekday::Sun),
        _ => None,
    }
}

fn named_weekday(token: &str) -> Option<Weekday> {
    let token = token.strip_suffix("요일").unwrap_or(token);
    let mut chars = token.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if let Some(day) = single_char_weekday(c) {
            return Some(day);
        }
    }
    // chrono accepts "mon", "Monday", ... case-insensitively
    token.parse::<Weekday>().ok()
}

// A token is either one day name or a run of single-character labels ("월수금").
fn parse_day_token(token: &str, days: &mut Vec<Weekday>) -> Option<()> {
    if let Some(day) = named_weekday(token) {
        days.push(day);
        return Some(());
    }
    for c in token.chars() {
        days.push(single_char_weekday(c)?);
    }
    Some(())
}

fn parse_days(text: &str) -> Option<Vec<Weekday>> {
    let mut days = Vec::new();
    for token in DAY_SEPARATORS.split(text).filter(|t| !t.is_empty()) {
        parse_day_token(token, &mut days)?;
    }
    if days.is_empty() {
        return None;
    }
    days.sort_by_key(|day| day.num_days_from_monday());
    days.dedup();
    Some(days)
}

fn parse_time(hour: &str, minute: &str) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(hour.parse().ok()?, minute.parse().ok()?, 0)
}

/// Parse a schedule such as `월,수 10:00-12:00`.
///
/// Anything that does not read as days followed by a forward time range
/// yields `None`; such schedules never conflict with anything.
pub fn parse(text: &str) -> Option<ScheduleWindow> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let captures = TIME_RANGE.captures(text)?;
    let whole = captures.get(0)?;
    if !text[whole.end()..].trim().is_empty() {
        return None;
    }

    let start_time = parse_time(&captures[1], &captures[2])?;
    let end_time = parse_time(&captures[3], &captures[4])?;
    if start_time >= end_time {
        return None;
    }

    let days = parse_days(&text[..whole.start()])?;
    Some(ScheduleWindow {
        days,
        start_time,
        end_time,
    })
}

/// Whether two schedule descriptions collide.
pub fn conflicts(a: &str, b: &str) -> bool {
    match (parse(a), parse(b)) {
        (Some(a), Some(b)) => a.collides_with(&b),
        _ => false,
    }
}

/// First existing schedule that collides with `candidate`.
///
/// Unset schedules (`None`) on either side never collide.
pub fn find_conflict<'a, I>(candidate: Option<&str>, existing: I) -> Option<&'a str>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let candidate = parse(candidate?)?;
    existing
        .into_iter()
        .flatten()
        .find(|text| parse(text).is_some_and(|window| candidate.collides_with(&window)))
}
