use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Singleton configuration row. Admins edit this through the settings
/// page; the verification engine and the order webhook read it on
/// every request so changes take effect immediately.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Settings {
    pub id: i32,
    pub convention_name: String,
    pub logo_url: Option<String>,
    pub friday_date: Option<NaiveDate>,
    pub saturday_date: Option<NaiveDate>,
    pub sunday_date: Option<NaiveDate>,
    pub event_timezone: String,
    pub auto_send_emails: bool,
    pub lockdown_mode: bool,
    pub receive_mode_enabled: bool,
    /// Shared secret for the migration receive endpoint. Write-only:
    /// set through the settings API, never echoed back.
    #[serde(skip_serializing)]
    pub receive_mode_secret: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Settings {
    /// The singleton row, if the instance has been seeded.
    pub async fn load(pool: &sqlx::PgPool) -> Result<Option<Settings>, sqlx::Error> {
        sqlx::query_as::<_, Settings>("SELECT * FROM settings LIMIT 1")
            .fetch_optional(pool)
            .await
    }

    /// Schedule view used by the door rules. Returns `None` when the
    /// stored timezone name does not parse; callers treat that the
    /// same as an unconfigured schedule and refuse admission.
    pub fn schedule(&self) -> Option<EventSchedule> {
        let timezone: Tz = self.event_timezone.parse().ok()?;
        Some(EventSchedule {
            friday: self.friday_date,
            saturday: self.saturday_date,
            sunday: self.sunday_date,
            timezone,
        })
    }
}

/// Subset served without authentication, enough for a landing page to
/// render the convention name, logo and dates.
#[derive(Debug, Clone, Serialize)]
pub struct PublicSettings {
    pub convention_name: String,
    pub logo_url: Option<String>,
    pub friday_date: Option<NaiveDate>,
    pub saturday_date: Option<NaiveDate>,
    pub sunday_date: Option<NaiveDate>,
    pub event_timezone: String,
}

impl From<&Settings> for PublicSettings {
    fn from(settings: &Settings) -> Self {
        PublicSettings {
            convention_name: settings.convention_name.clone(),
            logo_url: settings.logo_url.clone(),
            friday_date: settings.friday_date,
            saturday_date: settings.saturday_date,
            sunday_date: settings.sunday_date,
            event_timezone: settings.event_timezone.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSettingsRequest {
    pub convention_name: Option<String>,
    pub logo_url: Option<String>,
    pub friday_date: Option<NaiveDate>,
    pub saturday_date: Option<NaiveDate>,
    pub sunday_date: Option<NaiveDate>,
    pub event_timezone: Option<String>,
    pub auto_send_emails: Option<bool>,
    pub lockdown_mode: Option<bool>,
    pub receive_mode_enabled: Option<bool>,
    pub receive_mode_secret: Option<String>,
}

/// The three convention days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventDay {
    Friday,
    Saturday,
    Sunday,
}

impl EventDay {
    pub fn name(&self) -> &'static str {
        match self {
            EventDay::Friday => "Friday",
            EventDay::Saturday => "Saturday",
            EventDay::Sunday => "Sunday",
        }
    }
}

/// Event dates plus the timezone they are anchored in. "Today" for
/// admission purposes is always computed in this timezone, never in
/// UTC and never in the scanning device's local zone.
#[derive(Debug, Clone)]
pub struct EventSchedule {
    pub friday: Option<NaiveDate>,
    pub saturday: Option<NaiveDate>,
    pub sunday: Option<NaiveDate>,
    pub timezone: Tz,
}

impl EventSchedule {
    pub fn date_for(&self, day: EventDay) -> Option<NaiveDate> {
        match day {
            EventDay::Friday => self.friday,
            EventDay::Saturday => self.saturday,
            EventDay::Sunday => self.sunday,
        }
    }

    /// The calendar day at `now`, seen from the event's timezone.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_settings(timezone: &str) -> Settings {
        Settings {
            id: 1,
            convention_name: "Percussion Expo".to_string(),
            logo_url: None,
            friday_date: Some(NaiveDate::from_ymd_opt(2025, 6, 13).unwrap()),
            saturday_date: Some(NaiveDate::from_ymd_opt(2025, 6, 14).unwrap()),
            sunday_date: Some(NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()),
            event_timezone: timezone.to_string(),
            auto_send_emails: true,
            lockdown_mode: false,
            receive_mode_enabled: false,
            receive_mode_secret: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn schedule_parses_known_timezone() {
        let schedule = sample_settings("America/Chicago").schedule().unwrap();
        assert_eq!(schedule.timezone, chrono_tz::America::Chicago);
        assert_eq!(
            schedule.date_for(EventDay::Saturday),
            NaiveDate::from_ymd_opt(2025, 6, 14)
        );
    }

    #[test]
    fn schedule_rejects_bad_timezone() {
        assert!(sample_settings("Mars/Olympus_Mons").schedule().is_none());
    }

    #[test]
    fn local_date_uses_event_timezone_not_utc() {
        let schedule = sample_settings("America/Chicago").schedule().unwrap();
        // 03:00 UTC on June 15 is still 22:00 on June 14 in Chicago.
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 3, 0, 0).unwrap();
        assert_eq!(
            schedule.local_date(now),
            NaiveDate::from_ymd_opt(2025, 6, 14).unwrap()
        );
    }
}
