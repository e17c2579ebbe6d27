use serde::Serialize;

/// Check-in dashboard numbers. Attendee usage counts scan records,
/// student and exhibitor usage count the single-use flag, and
/// exhibitor badges roll up by order so a booth shows as checked in
/// once any of its badges has been scanned.
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub attendee: AttendeeStats,
    pub exhibitor: ExhibitorStats,
    pub student: StudentStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendeeStats {
    pub subtypes: Vec<SubtypeStats>,
    pub total: i64,
    pub scanned: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubtypeStats {
    pub subtype: String,
    pub label: String,
    pub total: i64,
    pub scanned: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExhibitorStats {
    pub orders: i64,
    pub orders_used: i64,
    pub tickets: i64,
    pub tickets_used: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentStats {
    pub total: i64,
    pub used: i64,
}
