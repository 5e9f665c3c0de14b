//! Visit persistence operations on the `visits` table.
//!
//! Transition rules live in `gatehouse-state`; SQL only guards against a
//! row moving between the caller's read and its write.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use gatehouse_state::{Visit, VisitStatus};

fn last_change(visit: &Visit) -> DateTime<Utc> {
    visit
        .transitions()
        .last()
        .map(|t| *t.at.as_datetime())
        .unwrap_or(*visit.created_at.as_datetime())
}

/// Insert a newly created visit in whatever status it was created with.
pub async fn insert(pool: &PgPool, visit: &Visit) -> Result<(), sqlx::Error> {
    let record = super::to_record_json(visit, "visit")?;

    sqlx::query(
        "INSERT INTO visits (id, visitor_id, unit_id, status, expected_at, valid_until,
                             entered_at, exited_at, record, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(*visit.id.as_uuid())
    .bind(visit.visitor_id.as_str())
    .bind(visit.unit_id.as_str())
    .bind(visit.status().as_str())
    .bind(*visit.expected_at.as_datetime())
    .bind(visit.valid_until().map(|t| *t.as_datetime()))
    .bind(visit.entered_at().map(|t| *t.as_datetime()))
    .bind(visit.exited_at().map(|t| *t.as_datetime()))
    .bind(&record)
    .bind(*visit.created_at.as_datetime())
    .bind(last_change(visit))
    .execute(pool)
    .await?;

    Ok(())
}

/// Write the new snapshot iff the stored status is `previous`, or already
/// the new status from an earlier write whose acknowledgement was lost.
///
/// Returns `false` when no row matched: the visit is missing or the stored
/// row is somewhere else entirely.
pub async fn update_state(
    pool: &PgPool,
    visit: &Visit,
    previous: VisitStatus,
) -> Result<bool, sqlx::Error> {
    let record = super::to_record_json(visit, "visit")?;

    let result = sqlx::query(
        "UPDATE visits
            SET status = $3, valid_until = $4, entered_at = $5, exited_at = $6,
                record = $7, updated_at = $8
          WHERE id = $1 AND status IN ($2, $3)",
    )
    .bind(*visit.id.as_uuid())
    .bind(previous.as_str())
    .bind(visit.status().as_str())
    .bind(visit.valid_until().map(|t| *t.as_datetime()))
    .bind(visit.entered_at().map(|t| *t.as_datetime()))
    .bind(visit.exited_at().map(|t| *t.as_datetime()))
    .bind(&record)
    .bind(last_change(visit))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Load one visit.
pub async fn load(pool: &PgPool, id: &Uuid) -> Result<Option<Visit>, sqlx::Error> {
    let row = sqlx::query_as::<_, VisitRow>("SELECT id, status, record FROM visits WHERE id = $1")
        .bind(*id)
        .fetch_optional(pool)
        .await?;
    Ok(row.and_then(VisitRow::into_record))
}

/// Load every visit, oldest first, for startup hydration.
pub async fn load_all(pool: &PgPool) -> Result<Vec<Visit>, sqlx::Error> {
    let rows = sqlx::query_as::<_, VisitRow>(
        "SELECT id, status, record FROM visits ORDER BY created_at ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().filter_map(VisitRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct VisitRow {
    id: Uuid,
    status: String,
    record: serde_json::Value,
}

impl VisitRow {
    /// Decode the snapshot. A row whose snapshot disagrees with its status
    /// column or fails its invariants is skipped and logged.
    fn into_record(self) -> Option<Visit> {
        let visit: Visit = match serde_json::from_value(self.record) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(visit_id = %self.id, error = %e, "undecodable visit snapshot; skipped");
                return None;
            }
        };
        if visit.status().as_str() != self.status {
            tracing::error!(
                visit_id = %self.id,
                column = %self.status,
                snapshot = %visit.status(),
                "visit status column disagrees with snapshot; skipped"
            );
            return None;
        }
        if let Err(violation) = visit.check_invariants() {
            tracing::error!(visit_id = %self.id, %violation, "visit snapshot violates invariants; skipped");
            return None;
        }
        Some(visit)
    }
}
