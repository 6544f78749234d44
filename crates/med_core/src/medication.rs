use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Literal frequency token meaning "every day of the week".
pub const EVERYDAY: &str = "Everyday";

/// Separator used when persisting a list of weekday names.
pub const WEEKDAY_SEPARATOR: &str = ", ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MedicationId(Uuid);

impl MedicationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MedicationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MedicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for MedicationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// One medication and its reminder schedule, stored in wire form.
///
/// Times and dates are kept as the strings the user entered so that a
/// malformed fragment only affects its own trigger when resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    #[serde(default)]
    pub id: MedicationId,
    pub name: String,
    #[serde(default)]
    pub times: Vec<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub specific_dates: Vec<String>,
    #[serde(default)]
    pub script_date: Option<String>,
    #[serde(default)]
    pub script_time: Option<String>,
}

impl Medication {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: MedicationId::new(),
            name: name.into(),
            times: Vec::new(),
            frequency: None,
            specific_dates: Vec::new(),
            script_date: None,
            script_time: None,
        }
    }

    pub fn with_times<I, S>(mut self, times: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.times = times.into_iter().map(Into::into).collect();
        self
    }

    pub fn everyday(mut self) -> Self {
        self.frequency = Some(EVERYDAY.to_string());
        self
    }

    pub fn with_frequency(mut self, frequency: impl Into<String>) -> Self {
        self.frequency = Some(frequency.into());
        self
    }

    pub fn on_weekdays(mut self, days: &[Weekday]) -> Self {
        let names: Vec<&str> = days.iter().map(|day| weekday_name(*day)).collect();
        self.frequency = Some(names.join(WEEKDAY_SEPARATOR));
        self
    }

    pub fn on_dates<I, S>(mut self, dates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.specific_dates = dates.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_script(mut self, date: impl Into<String>, time: impl Into<String>) -> Self {
        self.script_date = Some(date.into());
        self.script_time = Some(time.into());
        self
    }

    /// Frequency text, treating an empty or whitespace-only value as absent.
    pub fn frequency_text(&self) -> Option<&str> {
        self.frequency
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn has_frequency(&self) -> bool {
        self.frequency_text().is_some()
    }

    pub fn has_specific_dates(&self) -> bool {
        !self.specific_dates.is_empty()
    }

    pub fn is_everyday(&self) -> bool {
        self.frequency_text()
            .map(|value| value.contains(EVERYDAY))
            .unwrap_or(false)
    }

    /// Individual weekday tokens of the frequency field, trimmed.
    pub fn weekday_tokens(&self) -> Vec<&str> {
        self.frequency_text()
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|token| !token.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Parses `HH:MM`. Single-digit components are accepted; range is enforced.
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let (hour, minute) = raw.trim().split_once(':')?;
    let hour: u32 = hour.trim().parse().ok()?;
    let minute: u32 = minute.trim().parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Parses `YYYY-MM-DD`. Missing or zero components are rejected.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let mut parts = raw.trim().split('-');
    let year: i32 = parts.next()?.trim().parse().ok()?;
    let month: u32 = parts.next()?.trim().parse().ok()?;
    let day: u32 = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() || year == 0 || month == 0 || day == 0 {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// True when `raw` is exactly the zero-padded `HH:MM` rendering of a valid time.
pub fn is_canonical_time(raw: &str) -> bool {
    parse_time(raw)
        .map(|time| time.format("%H:%M").to_string() == raw)
        .unwrap_or(false)
}

/// True when `raw` is exactly the `YYYY-MM-DD` rendering of a valid date.
pub fn is_canonical_date(raw: &str) -> bool {
    parse_date(raw)
        .map(|date| date.format("%Y-%m-%d").to_string() == raw)
        .unwrap_or(false)
}

pub fn parse_weekday(name: &str) -> Option<Weekday> {
    match name.trim() {
        "Monday" => Some(Weekday::Mon),
        "Tuesday" => Some(Weekday::Tue),
        "Wednesday" => Some(Weekday::Wed),
        "Thursday" => Some(Weekday::Thu),
        "Friday" => Some(Weekday::Fri),
        "Saturday" => Some(Weekday::Sat),
        "Sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Notification weekday ordinal: Sunday = 1 through Saturday = 7.
pub fn weekday_ordinal(day: Weekday) -> u8 {
    day.number_from_sunday() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_times_and_dates() {
        assert_eq!(parse_time("08:30"), NaiveTime::from_hms_opt(8, 30, 0));
        assert_eq!(parse_time("8:05"), NaiveTime::from_hms_opt(8, 5, 0));
        assert_eq!(parse_time("xx:yy"), None);
        assert_eq!(parse_time("24:00"), None);
        assert_eq!(parse_time("0930"), None);

        assert_eq!(parse_date("2026-03-01"), NaiveDate::from_ymd_opt(2026, 3, 1));
        assert_eq!(parse_date("2026-00-01"), None);
        assert_eq!(parse_date("2026-02-30"), None);
        assert_eq!(parse_date("2026-03"), None);

        assert!(is_canonical_time("07:05"));
        assert!(!is_canonical_time("7:05"));
        assert!(is_canonical_date("2026-11-02"));
        assert!(!is_canonical_date("2026-11-2"));
    }

    #[test]
    fn maps_weekdays_from_sunday() {
        assert_eq!(weekday_ordinal(Weekday::Sun), 1);
        assert_eq!(weekday_ordinal(Weekday::Mon), 2);
        assert_eq!(weekday_ordinal(Weekday::Fri), 6);
        assert_eq!(weekday_ordinal(Weekday::Sat), 7);
        assert_eq!(parse_weekday(" Wednesday"), Some(Weekday::Wed));
        assert_eq!(parse_weekday("Funday"), None);
    }

    #[test]
    fn legacy_records_without_id_get_one() {
        let raw = r#"[
            {"name":"Aspirin 100mg","times":["08:00"],"frequency":"Everyday","specificDates":[],"scriptDate":null,"scriptTime":null},
            {"name":"Vitamin D","times":["09:00"],"frequency":null,"specificDates":["2030-01-01"]}
        ]"#;
        let meds: Vec<Medication> = serde_json::from_str(raw).expect("legacy json");
        assert_eq!(meds.len(), 2);
        assert_ne!(meds[0].id, meds[1].id);
        assert!(meds[0].is_everyday());
        assert!(!meds[1].has_frequency());
        assert_eq!(meds[1].specific_dates, vec!["2030-01-01".to_string()]);
    }

    #[test]
    fn weekday_frequency_round_trips_through_builder() {
        let med = Medication::new("Iron").on_weekdays(&[Weekday::Mon, Weekday::Fri]);
        assert_eq!(med.frequency.as_deref(), Some("Monday, Friday"));
        assert_eq!(med.weekday_tokens(), vec!["Monday", "Friday"]);
        assert!(!med.is_everyday());
    }
}
