use std::collections::HashSet;

use thiserror::Error;

use crate::medication::{is_canonical_date, is_canonical_time, parse_weekday, Medication};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("medication name must not be empty")]
    EmptyName,
    #[error("at least one reminder time is required")]
    NoTimes,
    #[error("reminder time `{0}` was entered more than once")]
    DuplicateTime(String),
    #[error("reminder time `{0}` is not in HH:MM form")]
    MalformedTime(String),
    #[error("date `{0}` is not in YYYY-MM-DD form")]
    MalformedDate(String),
    #[error("`{0}` is not a day of the week")]
    UnknownWeekday(String),
    #[error("choose either a frequency or specific dates, not both")]
    ConflictingSchedule,
    #[error("choose either specific dates or a frequency")]
    MissingSchedule,
    #[error("frequency names no days of the week")]
    NoWeekdays,
    #[error("a script reminder needs both a date and a time")]
    UnpairedScript,
}

/// Checks a candidate record before it is allowed into the store.
pub fn validate(candidate: &Medication) -> Result<(), ValidationError> {
    if candidate.name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if candidate.times.is_empty() {
        return Err(ValidationError::NoTimes);
    }

    let mut seen = HashSet::new();
    for time in &candidate.times {
        if !seen.insert(time.as_str()) {
            return Err(ValidationError::DuplicateTime(time.clone()));
        }
        if !is_canonical_time(time) {
            return Err(ValidationError::MalformedTime(time.clone()));
        }
    }

    match (candidate.has_frequency(), candidate.has_specific_dates()) {
        (true, true) => return Err(ValidationError::ConflictingSchedule),
        (false, false) => return Err(ValidationError::MissingSchedule),
        _ => {}
    }

    for date in &candidate.specific_dates {
        if !is_canonical_date(date) {
            return Err(ValidationError::MalformedDate(date.clone()));
        }
    }

    if candidate.has_frequency() && !candidate.is_everyday() {
        let tokens = candidate.weekday_tokens();
        if tokens.is_empty() {
            return Err(ValidationError::NoWeekdays);
        }
        for token in tokens {
            if parse_weekday(token).is_none() {
                return Err(ValidationError::UnknownWeekday(token.to_string()));
            }
        }
    }

    match (&candidate.script_date, &candidate.script_time) {
        (Some(date), Some(time)) => {
            if !is_canonical_date(date) {
                return Err(ValidationError::MalformedDate(date.clone()));
            }
            if !is_canonical_time(time) {
                return Err(ValidationError::MalformedTime(time.clone()));
            }
        }
        (None, None) => {}
        _ => return Err(ValidationError::UnpairedScript),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn daily() -> Medication {
        Medication::new("Metformin 500mg")
            .with_times(["08:00", "20:00"])
            .everyday()
    }

    #[test]
    fn accepts_well_formed_records() {
        assert_eq!(validate(&daily()), Ok(()));
        let dated = Medication::new("Antibiotic")
            .with_times(["07:30"])
            .on_dates(["2026-11-01", "2026-11-02"])
            .with_script("2026-11-20", "10:00");
        assert_eq!(validate(&dated), Ok(()));
    }

    #[test]
    fn rejects_both_or_neither_schedule() {
        let both = daily().on_dates(["2026-11-01"]);
        assert_eq!(validate(&both), Err(ValidationError::ConflictingSchedule));

        let neither = Medication::new("Statin").with_times(["21:00"]);
        assert_eq!(validate(&neither), Err(ValidationError::MissingSchedule));

        let blank_frequency = Medication::new("Statin")
            .with_times(["21:00"])
            .with_frequency("  ");
        assert_eq!(
            validate(&blank_frequency),
            Err(ValidationError::MissingSchedule)
        );
    }

    #[test]
    fn rejects_name_and_time_problems() {
        let mut unnamed = daily();
        unnamed.name = "   ".into();
        assert_eq!(validate(&unnamed), Err(ValidationError::EmptyName));

        let no_times = daily().with_times(Vec::<String>::new());
        assert_eq!(validate(&no_times), Err(ValidationError::NoTimes));

        let duplicate = daily().with_times(["08:00", "08:00"]);
        assert_eq!(
            validate(&duplicate),
            Err(ValidationError::DuplicateTime("08:00".into()))
        );

        let malformed = daily().with_times(["8am"]);
        assert_eq!(
            validate(&malformed),
            Err(ValidationError::MalformedTime("8am".into()))
        );
    }

    #[test]
    fn rejects_bad_weekdays_dates_and_half_scripts() {
        let weekdays = Medication::new("Iron")
            .with_times(["09:00"])
            .with_frequency("Monday, Someday");
        assert_eq!(
            validate(&weekdays),
            Err(ValidationError::UnknownWeekday("Someday".into()))
        );

        let dates = Medication::new("Iron")
            .with_times(["09:00"])
            .on_dates(["2026-13-01"]);
        assert_eq!(
            validate(&dates),
            Err(ValidationError::MalformedDate("2026-13-01".into()))
        );

        let separators_only = Medication::new("Ghost")
            .with_times(["08:00"])
            .with_frequency(", ,");
        assert_eq!(validate(&separators_only), Err(ValidationError::NoWeekdays));

        let mut half_script = daily();
        half_script.script_date = Some("2026-12-01".into());
        assert_eq!(validate(&half_script), Err(ValidationError::UnpairedScript));
    }
}
