use std::collections::HashMap;

use axum::extract::State;
use axum::response::IntoResponse;

use crate::middleware::auth::AdminUser;
use crate::models::stats::{
    AttendeeStats, ExhibitorStats, StatsResponse, StudentStats, SubtypeStats,
};
use crate::models::ticket::TicketSubtype;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

/// Check-in dashboard. Attendee usage comes from scan records,
/// student and exhibitor usage from the single-use flag.
pub async fn usage_stats(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
) -> Result<impl IntoResponse, AppError> {
    let attendee_rows = sqlx::query_as::<_, (Option<String>, i64, i64)>(
        "SELECT t.subtype, COUNT(*), COUNT(s.id) \
         FROM tickets t \
         LEFT JOIN ticket_scans s ON s.ticket_id = t.id \
         WHERE t.category = 'attendee' \
         GROUP BY t.subtype",
    )
    .fetch_all(&state.pool)
    .await?;

    let exhibitor_rows = sqlx::query_as::<_, (String, i64, i64)>(
        "SELECT COALESCE(t.order_id, 'manual_' || t.id::TEXT), \
                COUNT(*), \
                COUNT(*) FILTER (WHERE t.is_used) \
         FROM tickets t \
         WHERE t.category = 'exhibitor' \
         GROUP BY 1",
    )
    .fetch_all(&state.pool)
    .await?;

    let (student_total, student_used): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COUNT(*) FILTER (WHERE is_used) \
         FROM tickets WHERE category = 'student'",
    )
    .fetch_one(&state.pool)
    .await?;

    let response = StatsResponse {
        attendee: attendee_breakdown(attendee_rows),
        exhibitor: exhibitor_rollup(exhibitor_rows),
        student: StudentStats {
            total: student_total,
            used: student_used,
        },
    };

    Ok(success(response, "Usage statistics retrieved successfully"))
}

/// Project per-subtype counts onto the fixed dashboard rows. Rows for
/// keys outside the known set still count toward the totals so legacy
/// data does not vanish from the headline numbers.
fn attendee_breakdown(rows: Vec<(Option<String>, i64, i64)>) -> AttendeeStats {
    let mut by_key: HashMap<String, (i64, i64)> = HashMap::new();
    let mut total = 0;
    let mut scanned = 0;

    for (subtype, row_total, row_scanned) in rows {
        total += row_total;
        scanned += row_scanned;
        if let Some(key) = subtype {
            by_key.insert(key, (row_total, row_scanned));
        }
    }

    let subtypes = TicketSubtype::ALL
        .iter()
        .map(|subtype| {
            let (row_total, row_scanned) = by_key
                .get(subtype.key())
                .copied()
                .unwrap_or((0, 0));
            SubtypeStats {
                subtype: subtype.key().to_string(),
                label: subtype.short_label().to_string(),
                total: row_total,
                scanned: row_scanned,
            }
        })
        .collect();

    AttendeeStats {
        subtypes,
        total,
        scanned,
    }
}

/// One order is one booth regardless of badge count; the booth counts
/// as checked in when any of its badges has been used. Tickets with no
/// order id stand alone.
fn exhibitor_rollup(rows: Vec<(String, i64, i64)>) -> ExhibitorStats {
    let mut stats = ExhibitorStats {
        orders: 0,
        orders_used: 0,
        tickets: 0,
        tickets_used: 0,
    };

    for (_, tickets, used) in rows {
        stats.orders += 1;
        if used > 0 {
            stats.orders_used += 1;
        }
        stats.tickets += tickets;
        stats.tickets_used += used;
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakdown_covers_every_known_subtype() {
        let stats = attendee_breakdown(vec![
            (Some("vip".to_string()), 5, 3),
            (Some("adult_saturday".to_string()), 10, 0),
        ]);

        assert_eq!(stats.subtypes.len(), 8);
        assert_eq!(stats.total, 15);
        assert_eq!(stats.scanned, 3);

        let vip = stats.subtypes.iter().find(|s| s.subtype == "vip").unwrap();
        assert_eq!(vip.label, "VIP");
        assert_eq!(vip.total, 5);
        assert_eq!(vip.scanned, 3);

        let summit = stats
            .subtypes
            .iter()
            .find(|s| s.subtype == "cymbal_summit")
            .unwrap();
        assert_eq!(summit.total, 0);
    }

    #[test]
    fn unknown_subtype_counts_toward_totals_only() {
        let stats = attendee_breakdown(vec![
            (Some("weekend_mystery".to_string()), 4, 2),
            (None, 1, 0),
        ]);

        assert_eq!(stats.total, 5);
        assert_eq!(stats.scanned, 2);
        assert!(stats.subtypes.iter().all(|s| s.total == 0));
    }

    #[test]
    fn booth_counts_as_used_when_any_badge_is() {
        let stats = exhibitor_rollup(vec![
            ("order-1".to_string(), 3, 1),
            ("order-2".to_string(), 2, 0),
            ("manual_9".to_string(), 1, 1),
        ]);

        assert_eq!(stats.orders, 3);
        assert_eq!(stats.orders_used, 2);
        assert_eq!(stats.tickets, 6);
        assert_eq!(stats.tickets_used, 2);
    }
}
