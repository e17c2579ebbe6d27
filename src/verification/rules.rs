use chrono::NaiveDate;

use crate::models::settings::{EventDay, EventSchedule};
use crate::models::ticket::TicketSubtype;

/// Which convention days a pass admits on. Unknown or missing
/// subtypes get the empty set: a key we cannot place is never
/// admitted, it is not an error.
pub fn allowed_days(subtype: Option<TicketSubtype>) -> &'static [EventDay] {
    match subtype {
        Some(TicketSubtype::Vip) => &[EventDay::Friday, EventDay::Saturday, EventDay::Sunday],
        Some(TicketSubtype::Adult2Day) | Some(TicketSubtype::Child2Day) => {
            &[EventDay::Saturday, EventDay::Sunday]
        }
        Some(TicketSubtype::AdultSaturday) | Some(TicketSubtype::ChildSaturday) => {
            &[EventDay::Saturday]
        }
        Some(TicketSubtype::AdultSunday) | Some(TicketSubtype::ChildSunday) => {
            &[EventDay::Sunday]
        }
        Some(TicketSubtype::CymbalSummit) | None => &[],
    }
}

/// The allowed day whose configured date is `today`, if any.
/// Unconfigured dates never match.
pub fn admission_day(
    allowed: &[EventDay],
    schedule: &EventSchedule,
    today: NaiveDate,
) -> Option<EventDay> {
    allowed
        .iter()
        .copied()
        .find(|&day| schedule.date_for(day) == Some(today))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn schedule() -> EventSchedule {
        EventSchedule {
            friday: Some(NaiveDate::from_ymd_opt(2025, 6, 13).unwrap()),
            saturday: Some(NaiveDate::from_ymd_opt(2025, 6, 14).unwrap()),
            sunday: Some(NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()),
            timezone: chrono_tz::America::Chicago,
        }
    }

    #[test]
    fn day_table_matches_pass_catalog() {
        use EventDay::*;
        use TicketSubtype::*;

        assert_eq!(allowed_days(Some(Vip)), &[Friday, Saturday, Sunday]);
        assert_eq!(allowed_days(Some(Adult2Day)), &[Saturday, Sunday]);
        assert_eq!(allowed_days(Some(Child2Day)), &[Saturday, Sunday]);
        assert_eq!(allowed_days(Some(AdultSaturday)), &[Saturday]);
        assert_eq!(allowed_days(Some(ChildSaturday)), &[Saturday]);
        assert_eq!(allowed_days(Some(AdultSunday)), &[Sunday]);
        assert_eq!(allowed_days(Some(ChildSunday)), &[Sunday]);
    }

    #[test]
    fn legacy_and_unknown_subtypes_admit_nowhere() {
        assert!(allowed_days(Some(TicketSubtype::CymbalSummit)).is_empty());
        assert!(allowed_days(None).is_empty());
    }

    #[test]
    fn admission_day_picks_matching_day() {
        let sched = schedule();
        let saturday = NaiveDate::from_ymd_opt(2025, 6, 14).unwrap();
        assert_eq!(
            admission_day(&[EventDay::Saturday], &sched, saturday),
            Some(EventDay::Saturday)
        );
        assert_eq!(admission_day(&[EventDay::Sunday], &sched, saturday), None);
    }

    #[test]
    fn admission_day_ignores_unconfigured_dates() {
        let mut sched = schedule();
        sched.saturday = None;
        let saturday = NaiveDate::from_ymd_opt(2025, 6, 14).unwrap();
        assert_eq!(admission_day(&[EventDay::Saturday], &sched, saturday), None);
    }

    /// A Saturday pass scanned at 23:00 Chicago time on Saturday is
    /// still Saturday even though it is already Sunday in UTC; half
    /// an hour past local midnight it stops matching.
    #[test]
    fn saturday_pass_follows_event_timezone_not_utc() {
        let sched = schedule();
        let allowed = allowed_days(Some(TicketSubtype::AdultSaturday));

        // 2025-06-14T23:00-05:00 == 2025-06-15T04:00Z
        let late_saturday = Utc.with_ymd_and_hms(2025, 6, 15, 4, 0, 0).unwrap();
        let today = sched.local_date(late_saturday);
        assert_eq!(today, NaiveDate::from_ymd_opt(2025, 6, 14).unwrap());
        assert_eq!(
            admission_day(allowed, &sched, today),
            Some(EventDay::Saturday)
        );

        // 2025-06-15T00:30-05:00 == 2025-06-15T05:30Z
        let past_midnight = Utc.with_ymd_and_hms(2025, 6, 15, 5, 30, 0).unwrap();
        let today = sched.local_date(past_midnight);
        assert_eq!(today, NaiveDate::from_ymd_opt(2025, 6, 15).unwrap());
        assert_eq!(admission_day(allowed, &sched, today), None);
    }
}
