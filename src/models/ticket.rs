use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Broad class of ticket. Drives which verification flow applies:
/// students and exhibitors are single-use flags, attendees are
/// day-pass holders checked against the event schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TicketCategory {
    Student,
    Exhibitor,
    Attendee,
}

impl TicketCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketCategory::Student => "student",
            TicketCategory::Exhibitor => "exhibitor",
            TicketCategory::Attendee => "attendee",
        }
    }
}

impl fmt::Display for TicketCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(TicketCategory::Student),
            "exhibitor" => Ok(TicketCategory::Exhibitor),
            "attendee" => Ok(TicketCategory::Attendee),
            other => Err(format!("unknown ticket category: {}", other)),
        }
    }
}

/// Lifecycle status of a ticket. Only `valid` tickets are admitted at
/// the door. `refunded`, `cancelled` and `chargeback` are terminal and
/// must never transition back to `valid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TicketStatus {
    Valid,
    Invalid,
    Refunded,
    Cancelled,
    Chargeback,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Valid => "valid",
            TicketStatus::Invalid => "invalid",
            TicketStatus::Refunded => "refunded",
            TicketStatus::Cancelled => "cancelled",
            TicketStatus::Chargeback => "chargeback",
        }
    }

    /// Terminal statuses cannot be reinstated through the admin API.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TicketStatus::Refunded | TicketStatus::Cancelled | TicketStatus::Chargeback
        )
    }

    /// Whether an admin write may move a ticket from `self` to `next`.
    /// Terminal states can move between each other (a refund that
    /// turns into a chargeback stays recordable) but never back to
    /// valid.
    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        !(self.is_terminal() && next == TicketStatus::Valid)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "valid" => Ok(TicketStatus::Valid),
            "invalid" => Ok(TicketStatus::Invalid),
            "refunded" => Ok(TicketStatus::Refunded),
            "cancelled" => Ok(TicketStatus::Cancelled),
            "chargeback" => Ok(TicketStatus::Chargeback),
            other => Err(format!("unknown ticket status: {}", other)),
        }
    }
}

/// Catalog of attendee pass variants sold through the store.
///
/// The `subtype` column itself stays free-form text so rows imported
/// from older instances keep whatever key they were issued with;
/// parsing happens where the catalog matters (order intake, emails,
/// door rules). Unknown keys simply fail to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketSubtype {
    #[serde(rename = "vip")]
    Vip,
    #[serde(rename = "adult_2day")]
    Adult2Day,
    #[serde(rename = "adult_saturday")]
    AdultSaturday,
    #[serde(rename = "adult_sunday")]
    AdultSunday,
    #[serde(rename = "child_2day")]
    Child2Day,
    #[serde(rename = "child_saturday")]
    ChildSaturday,
    #[serde(rename = "child_sunday")]
    ChildSunday,
    #[serde(rename = "cymbal_summit")]
    CymbalSummit,
}

impl TicketSubtype {
    /// Catalog in the order the stats dashboard lists it.
    pub const ALL: [TicketSubtype; 8] = [
        TicketSubtype::Vip,
        TicketSubtype::CymbalSummit,
        TicketSubtype::Adult2Day,
        TicketSubtype::Child2Day,
        TicketSubtype::AdultSaturday,
        TicketSubtype::AdultSunday,
        TicketSubtype::ChildSaturday,
        TicketSubtype::ChildSunday,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            TicketSubtype::Vip => "vip",
            TicketSubtype::Adult2Day => "adult_2day",
            TicketSubtype::AdultSaturday => "adult_saturday",
            TicketSubtype::AdultSunday => "adult_sunday",
            TicketSubtype::Child2Day => "child_2day",
            TicketSubtype::ChildSaturday => "child_saturday",
            TicketSubtype::ChildSunday => "child_sunday",
            TicketSubtype::CymbalSummit => "cymbal_summit",
        }
    }

    /// Full pass name as it appears in ticket emails.
    pub fn label(&self) -> &'static str {
        match self {
            TicketSubtype::Vip => "VIP Pass (Friday, Saturday, Sunday)",
            TicketSubtype::Adult2Day => "Adult 2-Day Pass (Saturday, Sunday)",
            TicketSubtype::AdultSaturday => "Adult 1-Day Pass (Saturday Only)",
            TicketSubtype::AdultSunday => "Adult 1-Day Pass (Sunday Only)",
            TicketSubtype::Child2Day => "Child 2-Day Pass (Saturday, Sunday)",
            TicketSubtype::ChildSaturday => "Child 1-Day Pass (Saturday Only)",
            TicketSubtype::ChildSunday => "Child 1-Day Pass (Sunday Only)",
            TicketSubtype::CymbalSummit => "Cymbal Summit Pass",
        }
    }

    /// Short name for dashboards and stat rows.
    pub fn short_label(&self) -> &'static str {
        match self {
            TicketSubtype::Vip => "VIP",
            TicketSubtype::Adult2Day => "Adult 2-Day",
            TicketSubtype::AdultSaturday => "Adult Saturday",
            TicketSubtype::AdultSunday => "Adult Sunday",
            TicketSubtype::Child2Day => "Child 2-Day",
            TicketSubtype::ChildSaturday => "Child Saturday",
            TicketSubtype::ChildSunday => "Child Sunday",
            TicketSubtype::CymbalSummit => "Cymbal Summit",
        }
    }

    /// Variants the order webhook accepts. The legacy summit pass is
    /// kept for display and stats but is no longer sold.
    pub fn is_sellable(&self) -> bool {
        !matches!(self, TicketSubtype::CymbalSummit)
    }
}

impl fmt::Display for TicketSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for TicketSubtype {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vip" => Ok(TicketSubtype::Vip),
            "adult_2day" => Ok(TicketSubtype::Adult2Day),
            "adult_saturday" => Ok(TicketSubtype::AdultSaturday),
            "adult_sunday" => Ok(TicketSubtype::AdultSunday),
            "child_2day" => Ok(TicketSubtype::Child2Day),
            "child_saturday" => Ok(TicketSubtype::ChildSaturday),
            "child_sunday" => Ok(TicketSubtype::ChildSunday),
            "cymbal_summit" => Ok(TicketSubtype::CymbalSummit),
            other => Err(format!("unknown ticket subtype: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: i32,
    pub uuid: Uuid,
    pub category: TicketCategory,
    pub subtype: Option<String>,
    pub name: String,
    pub teacher_name: Option<String>,
    pub email: String,
    pub status: TicketStatus,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub order_id: Option<String>,
    pub email_sent: bool,
    pub email_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    /// Parsed subtype, if the stored key is one we know about.
    pub fn subtype_kind(&self) -> Option<TicketSubtype> {
        self.subtype.as_deref().and_then(|s| s.parse().ok())
    }

    /// Display name for the pass, falling back to the raw key for
    /// subtypes imported from elsewhere.
    pub fn subtype_label(&self) -> Option<String> {
        match self.subtype_kind() {
            Some(subtype) => Some(subtype.label().to_string()),
            None => self.subtype.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketSupply {
    pub id: i32,
    pub ticket_id: i32,
    pub supply_name: String,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

/// Supply line as it travels through the API and emails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplyItem {
    pub name: String,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTicketRequest {
    pub category: TicketCategory,
    pub subtype: Option<String>,
    pub name: String,
    pub teacher_name: Option<String>,
    pub email: String,
    #[serde(default)]
    pub supplies: Vec<SupplyItem>,
    pub send_email: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: TicketStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtype_keys_round_trip() {
        for subtype in TicketSubtype::ALL {
            assert_eq!(subtype.key().parse::<TicketSubtype>(), Ok(subtype));
        }
    }

    #[test]
    fn unknown_subtype_fails_to_parse() {
        assert!("weekend_mega_pass".parse::<TicketSubtype>().is_err());
        assert!("".parse::<TicketSubtype>().is_err());
    }

    #[test]
    fn legacy_summit_pass_is_not_sellable() {
        assert!(!TicketSubtype::CymbalSummit.is_sellable());
        assert!(TicketSubtype::Vip.is_sellable());
        assert!(TicketSubtype::ChildSunday.is_sellable());
    }

    #[test]
    fn terminal_statuses() {
        assert!(TicketStatus::Refunded.is_terminal());
        assert!(TicketStatus::Cancelled.is_terminal());
        assert!(TicketStatus::Chargeback.is_terminal());
        assert!(!TicketStatus::Valid.is_terminal());
        assert!(!TicketStatus::Invalid.is_terminal());
    }

    #[test]
    fn terminal_statuses_never_return_to_valid() {
        for status in [
            TicketStatus::Refunded,
            TicketStatus::Cancelled,
            TicketStatus::Chargeback,
        ] {
            assert!(!status.can_transition_to(TicketStatus::Valid));
        }
    }

    #[test]
    fn non_reinstating_status_writes_are_allowed() {
        assert!(TicketStatus::Refunded.can_transition_to(TicketStatus::Chargeback));
        assert!(TicketStatus::Cancelled.can_transition_to(TicketStatus::Refunded));
        assert!(TicketStatus::Valid.can_transition_to(TicketStatus::Refunded));
        assert!(TicketStatus::Valid.can_transition_to(TicketStatus::Invalid));
        assert!(TicketStatus::Invalid.can_transition_to(TicketStatus::Valid));
    }

    #[test]
    fn subtype_label_falls_back_to_raw_key() {
        let ticket = Ticket {
            id: 1,
            uuid: Uuid::new_v4(),
            category: TicketCategory::Attendee,
            subtype: Some("weekend_mega_pass".to_string()),
            name: "Ada".to_string(),
            teacher_name: None,
            email: "ada@example.com".to_string(),
            status: TicketStatus::Valid,
            is_used: false,
            used_at: None,
            order_id: None,
            email_sent: false,
            email_sent_at: None,
            created_at: Utc::now(),
        };
        assert_eq!(ticket.subtype_label().as_deref(), Some("weekend_mega_pass"));
        assert_eq!(ticket.subtype_kind(), None);
    }
}
