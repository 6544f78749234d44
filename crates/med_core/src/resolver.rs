//! Expansion of medication records into concrete notification triggers.
//!
//! Resolution never fails. Fragments that cannot be turned into a trigger
//! (malformed times or dates, unknown weekday names, instants that have
//! already elapsed) are skipped and reported as [`Diagnostic`]s so the rest of
//! the medication, and every other medication, still resolves.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::medication::{
    parse_date, parse_time, parse_weekday, weekday_ordinal, Medication, MedicationId,
};
use crate::trigger::{Payload, TriggerPurpose, TriggerSchedule, TriggerSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Unschedulable {
    BothSchedules,
    NoSchedule,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Diagnostic {
    MalformedTime { medication: MedicationId, value: String },
    MalformedDate { medication: MedicationId, value: String },
    UnknownWeekday { medication: MedicationId, value: String },
    MalformedScript { medication: MedicationId, date: String, time: String },
    ElapsedDate { medication: MedicationId, date: NaiveDate, time: NaiveTime },
    ElapsedScript { medication: MedicationId, date: NaiveDate, time: NaiveTime },
    NonexistentLocalTime { medication: MedicationId, date: NaiveDate, time: NaiveTime },
    Unschedulable { medication: MedicationId, reason: Unschedulable },
}

impl Diagnostic {
    pub fn medication(&self) -> MedicationId {
        match self {
            Diagnostic::MalformedTime { medication, .. }
            | Diagnostic::MalformedDate { medication, .. }
            | Diagnostic::UnknownWeekday { medication, .. }
            | Diagnostic::MalformedScript { medication, .. }
            | Diagnostic::ElapsedDate { medication, .. }
            | Diagnostic::ElapsedScript { medication, .. }
            | Diagnostic::NonexistentLocalTime { medication, .. }
            | Diagnostic::Unschedulable { medication, .. } => *medication,
        }
    }

    /// Elapsed instants are expected over a medication's lifetime and are not
    /// treated as input problems.
    pub fn is_elapsed(&self) -> bool {
        matches!(
            self,
            Diagnostic::ElapsedDate { .. } | Diagnostic::ElapsedScript { .. }
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MalformedTime { medication, value } => {
                write!(f, "{medication}: invalid time `{value}`")
            }
            Diagnostic::MalformedDate { medication, value } => {
                write!(f, "{medication}: invalid date `{value}`")
            }
            Diagnostic::UnknownWeekday { medication, value } => {
                write!(f, "{medication}: invalid day of the week `{value}`")
            }
            Diagnostic::MalformedScript {
                medication,
                date,
                time,
            } => write!(f, "{medication}: invalid script reminder `{date} {time}`"),
            Diagnostic::ElapsedDate {
                medication,
                date,
                time,
            } => write!(f, "{medication}: {date} {} is in the past", time.format("%H:%M")),
            Diagnostic::ElapsedScript {
                medication,
                date,
                time,
            } => write!(
                f,
                "{medication}: script reminder {date} {} is in the past",
                time.format("%H:%M")
            ),
            Diagnostic::NonexistentLocalTime {
                medication,
                date,
                time,
            } => write!(
                f,
                "{medication}: {date} {} does not exist in local time",
                time.format("%H:%M")
            ),
            Diagnostic::Unschedulable { medication, reason } => match reason {
                Unschedulable::BothSchedules => {
                    write!(f, "{medication}: has both a frequency and specific dates")
                }
                Unschedulable::NoSchedule => {
                    write!(f, "{medication}: has neither a frequency nor specific dates")
                }
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub triggers: Vec<TriggerSpec>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    pub fn extend(&mut self, other: Resolution) {
        self.triggers.extend(other.triggers);
        self.diagnostics.extend(other.diagnostics);
    }

    fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        if diagnostic.is_elapsed() {
            debug!(%diagnostic, "dropping elapsed reminder");
        } else {
            warn!(%diagnostic, "skipping reminder fragment");
        }
        self.diagnostics.push(diagnostic);
    }
}

/// Resolves every medication against the same reference instant, in order.
pub fn resolve_all<Tz: TimeZone>(medications: &[Medication], now: &DateTime<Tz>) -> Resolution {
    let mut resolution = Resolution::default();
    for medication in medications {
        resolution.extend(resolve_medication(medication, now));
    }
    resolution
}

/// Expands one medication into triggers. Dates are interpreted in the time
/// zone of `now`.
pub fn resolve_medication<Tz: TimeZone>(medication: &Medication, now: &DateTime<Tz>) -> Resolution {
    let mut out = Resolution::default();
    let id = medication.id;

    let mut times = Vec::with_capacity(medication.times.len());
    for raw in &medication.times {
        match parse_time(raw) {
            Some(time) => times.push(time),
            None => out.push_diagnostic(Diagnostic::MalformedTime {
                medication: id,
                value: raw.clone(),
            }),
        }
    }

    match (medication.has_frequency(), medication.has_specific_dates()) {
        (true, true) => out.push_diagnostic(Diagnostic::Unschedulable {
            medication: id,
            reason: Unschedulable::BothSchedules,
        }),
        (false, false) => out.push_diagnostic(Diagnostic::Unschedulable {
            medication: id,
            reason: Unschedulable::NoSchedule,
        }),
        (false, true) => resolve_dates(medication, &times, now, &mut out),
        (true, false) if medication.is_everyday() => {
            let payload = Payload::dose(&medication.name);
            for time in &times {
                out.triggers.push(TriggerSpec {
                    medication: id,
                    purpose: TriggerPurpose::Dose,
                    schedule: TriggerSchedule::RecurringDaily {
                        hour: time.hour(),
                        minute: time.minute(),
                    },
                    payload: payload.clone(),
                });
            }
        }
        (true, false) => resolve_weekdays(medication, &times, &mut out),
    }

    resolve_script(medication, now, &mut out);
    out
}

fn resolve_dates<Tz: TimeZone>(
    medication: &Medication,
    times: &[NaiveTime],
    now: &DateTime<Tz>,
    out: &mut Resolution,
) {
    let mut dates = Vec::with_capacity(medication.specific_dates.len());
    for raw in &medication.specific_dates {
        match parse_date(raw) {
            Some(date) => dates.push(date),
            None => out.push_diagnostic(Diagnostic::MalformedDate {
                medication: medication.id,
                value: raw.clone(),
            }),
        }
    }

    let payload = Payload::dose(&medication.name);
    for time in times {
        for date in &dates {
            match future_instant(*date, *time, now) {
                Instant::Future(fire_at) => out.triggers.push(TriggerSpec {
                    medication: medication.id,
                    purpose: TriggerPurpose::Dose,
                    schedule: TriggerSchedule::Oneshot { fire_at },
                    payload: payload.clone(),
                }),
                Instant::Elapsed => out.push_diagnostic(Diagnostic::ElapsedDate {
                    medication: medication.id,
                    date: *date,
                    time: *time,
                }),
                Instant::Nonexistent => out.push_diagnostic(Diagnostic::NonexistentLocalTime {
                    medication: medication.id,
                    date: *date,
                    time: *time,
                }),
            }
        }
    }
}

fn resolve_weekdays(medication: &Medication, times: &[NaiveTime], out: &mut Resolution) {
    let tokens = medication.weekday_tokens();
    if tokens.is_empty() {
        out.push_diagnostic(Diagnostic::Unschedulable {
            medication: medication.id,
            reason: Unschedulable::NoSchedule,
        });
        return;
    }

    let mut weekdays = Vec::new();
    for token in tokens {
        match parse_weekday(token) {
            Some(day) => weekdays.push(weekday_ordinal(day)),
            None => out.push_diagnostic(Diagnostic::UnknownWeekday {
                medication: medication.id,
                value: token.to_string(),
            }),
        }
    }

    let payload = Payload::dose(&medication.name);
    for time in times {
        for weekday in &weekdays {
            out.triggers.push(TriggerSpec {
                medication: medication.id,
                purpose: TriggerPurpose::Dose,
                schedule: TriggerSchedule::RecurringWeekly {
                    hour: time.hour(),
                    minute: time.minute(),
                    weekday: *weekday,
                },
                payload: payload.clone(),
            });
        }
    }
}

fn resolve_script<Tz: TimeZone>(medication: &Medication, now: &DateTime<Tz>, out: &mut Resolution) {
    let (Some(raw_date), Some(raw_time)) = (&medication.script_date, &medication.script_time) else {
        return;
    };
    let (Some(date), Some(time)) = (parse_date(raw_date), parse_time(raw_time)) else {
        out.push_diagnostic(Diagnostic::MalformedScript {
            medication: medication.id,
            date: raw_date.clone(),
            time: raw_time.clone(),
        });
        return;
    };

    match future_instant(date, time, now) {
        Instant::Future(fire_at) => out.triggers.push(TriggerSpec {
            medication: medication.id,
            purpose: TriggerPurpose::ScriptRenewal,
            schedule: TriggerSchedule::Oneshot { fire_at },
            payload: Payload::script_renewal(&medication.name),
        }),
        Instant::Elapsed => out.push_diagnostic(Diagnostic::ElapsedScript {
            medication: medication.id,
            date,
            time,
        }),
        Instant::Nonexistent => out.push_diagnostic(Diagnostic::NonexistentLocalTime {
            medication: medication.id,
            date,
            time,
        }),
    }
}

enum Instant {
    Future(DateTime<Utc>),
    Elapsed,
    Nonexistent,
}

fn future_instant<Tz: TimeZone>(date: NaiveDate, time: NaiveTime, now: &DateTime<Tz>) -> Instant {
    let naive = date.and_time(time);
    // Ambiguous local times (DST fall-back) resolve to the earlier instant.
    match now.timezone().from_local_datetime(&naive).earliest() {
        Some(instant) if instant > *now => Instant::Future(instant.with_timezone(&Utc)),
        Some(_) => Instant::Elapsed,
        None => Instant::Nonexistent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset, Weekday};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
    }

    #[test]
    fn everyday_expands_to_one_daily_trigger_per_time() {
        let med = Medication::new("Metformin")
            .with_times(["08:00", "20:00"])
            .everyday();
        let resolution = resolve_medication(&med, &now());
        let schedules: Vec<_> = resolution.triggers.iter().map(|t| t.schedule).collect();
        assert_eq!(
            schedules,
            vec![
                TriggerSchedule::RecurringDaily { hour: 8, minute: 0 },
                TriggerSchedule::RecurringDaily { hour: 20, minute: 0 },
            ]
        );
        assert!(resolution.diagnostics.is_empty());
        assert_eq!(resolution.triggers[0].payload.body, "Remember to take: Metformin");
    }

    #[test]
    fn weekday_frequency_maps_sunday_first_ordinals() {
        let med = Medication::new("Methotrexate")
            .with_times(["09:00"])
            .with_frequency("Monday, Friday");
        let resolution = resolve_medication(&med, &now());
        let schedules: Vec<_> = resolution.triggers.iter().map(|t| t.schedule).collect();
        assert_eq!(
            schedules,
            vec![
                TriggerSchedule::RecurringWeekly { hour: 9, minute: 0, weekday: 2 },
                TriggerSchedule::RecurringWeekly { hour: 9, minute: 0, weekday: 6 },
            ]
        );
    }

    #[test]
    fn unknown_weekday_is_skipped_not_fatal() {
        let med = Medication::new("Iron")
            .with_times(["07:15"])
            .with_frequency("Sunday, Caturday, Saturday");
        let resolution = resolve_medication(&med, &now());
        assert_eq!(resolution.triggers.len(), 2);
        assert_eq!(
            resolution.diagnostics,
            vec![Diagnostic::UnknownWeekday {
                medication: med.id,
                value: "Caturday".into()
            }]
        );
    }

    #[test]
    fn frequency_without_day_names_is_reported() {
        let med = Medication::new("Ghost")
            .with_times(["08:00"])
            .with_frequency(", ,");
        let resolution = resolve_medication(&med, &now());
        assert!(resolution.triggers.is_empty());
        assert_eq!(
            resolution.diagnostics,
            vec![Diagnostic::Unschedulable {
                medication: med.id,
                reason: Unschedulable::NoSchedule
            }]
        );
    }

    #[test]
    fn past_specific_dates_are_dropped() {
        let med = Medication::new("Flu shot")
            .with_times(["10:00"])
            .on_dates(["2000-01-01"]);
        let resolution = resolve_medication(&med, &now());
        assert!(resolution.triggers.is_empty());
        assert_eq!(resolution.diagnostics.len(), 1);
        assert!(resolution.diagnostics[0].is_elapsed());
    }

    #[test]
    fn specific_dates_only_emit_strictly_future_oneshots() {
        let med = Medication::new("Antibiotic")
            .with_times(["12:00", "18:00"])
            .on_dates(["2026-10-18", "2026-10-19"]);
        let resolution = resolve_medication(&med, &now());
        let fire_times: Vec<_> = resolution
            .triggers
            .iter()
            .map(|t| match t.schedule {
                TriggerSchedule::Oneshot { fire_at } => fire_at,
                other => panic!("unexpected schedule {other:?}"),
            })
            .collect();
        // 12:00 today equals `now` and is not strictly in the future.
        assert_eq!(
            fire_times,
            vec![
                Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2026, 10, 18, 18, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2026, 10, 19, 18, 0, 0).unwrap(),
            ]
        );
        assert_eq!(resolution.diagnostics.len(), 1);
    }

    #[test]
    fn dates_are_interpreted_in_the_reference_time_zone() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let local_now = offset.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap();
        let med = Medication::new("Drops")
            .with_times(["10:00"])
            .on_dates(["2026-10-18"]);
        let resolution = resolve_medication(&med, &local_now);
        assert_eq!(
            resolution.triggers[0].schedule,
            TriggerSchedule::Oneshot {
                fire_at: Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap()
            }
        );
    }

    #[test]
    fn script_reminder_is_independent_of_main_schedule() {
        let tomorrow = (now() + Duration::days(1)).date_naive();
        let med = Medication::new("Sertraline")
            .with_times(["08:00"])
            .everyday()
            .with_script(tomorrow.format("%Y-%m-%d").to_string(), "10:00");
        let resolution = resolve_medication(&med, &now());
        assert_eq!(resolution.triggers.len(), 2);
        let script = &resolution.triggers[1];
        assert_eq!(script.purpose, TriggerPurpose::ScriptRenewal);
        assert_eq!(script.payload, Payload::script_renewal("Sertraline"));
        assert_eq!(
            script.schedule,
            TriggerSchedule::Oneshot {
                fire_at: Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap()
            }
        );
    }

    #[test]
    fn elapsed_script_reminder_is_dropped() {
        let med = Medication::new("Sertraline")
            .with_times(["08:00"])
            .everyday()
            .with_script("2026-10-01", "10:00");
        let resolution = resolve_medication(&med, &now());
        assert_eq!(resolution.triggers.len(), 1);
        assert!(matches!(
            resolution.diagnostics.as_slice(),
            [Diagnostic::ElapsedScript { .. }]
        ));
    }

    #[test]
    fn malformed_time_does_not_affect_other_times() {
        let med = Medication::new("Vitamin C")
            .with_times(["xx:yy", "13:45"])
            .everyday();
        let resolution = resolve_medication(&med, &now());
        assert_eq!(
            resolution.triggers.iter().map(|t| t.schedule).collect::<Vec<_>>(),
            vec![TriggerSchedule::RecurringDaily { hour: 13, minute: 45 }]
        );
        assert_eq!(
            resolution.diagnostics,
            vec![Diagnostic::MalformedTime {
                medication: med.id,
                value: "xx:yy".into()
            }]
        );
    }

    #[test]
    fn unschedulable_records_keep_their_script_reminder() {
        let both = Medication::new("Confused")
            .with_times(["08:00"])
            .everyday()
            .on_dates(["2026-12-01"])
            .with_script("2026-12-24", "09:30");
        let resolution = resolve_medication(&both, &now());
        assert_eq!(resolution.triggers.len(), 1);
        assert_eq!(resolution.triggers[0].purpose, TriggerPurpose::ScriptRenewal);
        assert!(matches!(
            resolution.diagnostics.as_slice(),
            [Diagnostic::Unschedulable {
                reason: Unschedulable::BothSchedules,
                ..
            }]
        ));

        let neither = Medication::new("Empty").with_times(["08:00"]);
        assert!(resolve_medication(&neither, &now()).is_empty());
    }

    #[test]
    fn resolving_twice_is_identical_and_keeps_store_order() {
        let meds = vec![
            Medication::new("A").with_times(["20:00", "08:00"]).everyday(),
            Medication::new("B")
                .with_times(["09:00"])
                .on_weekdays(&[Weekday::Wed]),
            Medication::new("C")
                .with_times(["06:00"])
                .on_dates(["2026-11-05", "2026-11-04"]),
        ];
        let first = resolve_all(&meds, &now());
        let second = resolve_all(&meds, &now());
        assert_eq!(first, second);

        let owners: Vec<_> = first.triggers.iter().map(|t| t.medication).collect();
        assert_eq!(
            owners,
            vec![meds[0].id, meds[0].id, meds[1].id, meds[2].id, meds[2].id]
        );
        assert_eq!(
            first.triggers[0].schedule,
            TriggerSchedule::RecurringDaily { hour: 20, minute: 0 }
        );
    }
}
