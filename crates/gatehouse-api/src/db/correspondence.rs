//! Correspondence persistence operations on the `correspondence` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use gatehouse_state::{Correspondence, CorrespondenceStatus};

fn last_change(item: &Correspondence) -> DateTime<Utc> {
    item.transitions()
        .last()
        .map(|t| *t.at.as_datetime())
        .unwrap_or(*item.received_at.as_datetime())
}

/// Insert a newly received item.
pub async fn insert(pool: &PgPool, item: &Correspondence) -> Result<(), sqlx::Error> {
    let record = super::to_record_json(item, "correspondence")?;

    sqlx::query(
        "INSERT INTO correspondence (id, unit_id, status, received_at, delivered_at, record, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(*item.id.as_uuid())
    .bind(item.unit_id.as_str())
    .bind(item.status().as_str())
    .bind(*item.received_at.as_datetime())
    .bind(item.delivered_at().map(|t| *t.as_datetime()))
    .bind(&record)
    .bind(last_change(item))
    .execute(pool)
    .await?;

    Ok(())
}

/// Write the new snapshot iff the stored status is `previous` or already
/// the new status.
pub async fn update_state(
    pool: &PgPool,
    item: &Correspondence,
    previous: CorrespondenceStatus,
) -> Result<bool, sqlx::Error> {
    let record = super::to_record_json(item, "correspondence")?;

    let result = sqlx::query(
        "UPDATE correspondence
            SET status = $3, delivered_at = $4, record = $5, updated_at = $6
          WHERE id = $1 AND status IN ($2, $3)",
    )
    .bind(*item.id.as_uuid())
    .bind(previous.as_str())
    .bind(item.status().as_str())
    .bind(item.delivered_at().map(|t| *t.as_datetime()))
    .bind(&record)
    .bind(last_change(item))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Load one item.
pub async fn load(pool: &PgPool, id: &Uuid) -> Result<Option<Correspondence>, sqlx::Error> {
    let row = sqlx::query_as::<_, CorrespondenceRow>("SELECT id, record FROM correspondence WHERE id = $1")
        .bind(*id)
        .fetch_optional(pool)
        .await?;
    Ok(row.and_then(CorrespondenceRow::into_record))
}

/// Load every item for startup hydration.
pub async fn load_all(pool: &PgPool) -> Result<Vec<Correspondence>, sqlx::Error> {
    let rows = sqlx::query_as::<_, CorrespondenceRow>(
        "SELECT id, record FROM correspondence ORDER BY received_at ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().filter_map(CorrespondenceRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct CorrespondenceRow {
    id: Uuid,
    record: serde_json::Value,
}

impl CorrespondenceRow {
    fn into_record(self) -> Option<Correspondence> {
        match serde_json::from_value(self.record) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::error!(correspondence_id = %self.id, error = %e, "undecodable correspondence snapshot; skipped");
                None
            }
        }
    }
}
