//! PostgreSQL corpus loader.

use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};

use switchboard_core::Flag;

use crate::db::{assemble, ConstraintRow, DistributionRow, FlagRow, SegmentRow, VariantRow};
use crate::error::StorageResult;

/// Loads the complete corpus under one repeatable-read transaction.
pub(crate) async fn load_all(pool: &Pool<Postgres>) -> StorageResult<Vec<Flag>> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
        .execute(&mut *tx)
        .await?;

    let flag_rows = sqlx::query(
        r#"
        SELECT id, key, description, enabled, data_record_type, updated_at, notes
        FROM flags
        ORDER BY id
        "#,
    )
    .fetch_all(&mut *tx)
    .await?
    .iter()
    .map(|row| -> StorageResult<FlagRow> {
        Ok(FlagRow {
            id: row.try_get("id")?,
            key: row.try_get("key")?,
            description: row.try_get("description")?,
            enabled: row.try_get("enabled")?,
            data_record_type: row.try_get("data_record_type")?,
            updated_at: row.try_get("updated_at")?,
            notes: row.try_get("notes")?,
        })
    })
    .collect::<StorageResult<Vec<_>>>()?;

    let variant_rows = sqlx::query(
        r#"
        SELECT id, flag_id, key, attachment
        FROM variants
        ORDER BY flag_id, id
        "#,
    )
    .fetch_all(&mut *tx)
    .await?
    .iter()
    .map(|row| -> StorageResult<VariantRow> {
        // The attachment column is TEXT in both dialects; decode to a
        // string first, then parse.
        let attachment: Option<String> = row.try_get("attachment")?;
        let attachment = attachment
            .map(|text| serde_json::from_str::<JsonValue>(&text))
            .transpose()?;
        Ok(VariantRow {
            id: row.try_get("id")?,
            flag_id: row.try_get("flag_id")?,
            key: row.try_get("key")?,
            attachment,
        })
    })
    .collect::<StorageResult<Vec<_>>>()?;

    let segment_rows = sqlx::query(
        r#"
        SELECT id, flag_id, description, rank, rollout_percent
        FROM segments
        ORDER BY flag_id, rank, id
        "#,
    )
    .fetch_all(&mut *tx)
    .await?
    .iter()
    .map(|row| -> StorageResult<SegmentRow> {
        Ok(SegmentRow {
            id: row.try_get("id")?,
            flag_id: row.try_get("flag_id")?,
            description: row.try_get("description")?,
            rank: row.try_get("rank")?,
            rollout_percent: row.try_get("rollout_percent")?,
        })
    })
    .collect::<StorageResult<Vec<_>>>()?;

    let constraint_rows = sqlx::query(
        r#"
        SELECT id, segment_id, property, operator, value
        FROM constraints
        ORDER BY segment_id, id
        "#,
    )
    .fetch_all(&mut *tx)
    .await?
    .iter()
    .map(|row| -> StorageResult<ConstraintRow> {
        Ok(ConstraintRow {
            id: row.try_get("id")?,
            segment_id: row.try_get("segment_id")?,
            property: row.try_get("property")?,
            operator: row.try_get("operator")?,
            value: row.try_get("value")?,
        })
    })
    .collect::<StorageResult<Vec<_>>>()?;

    let distribution_rows = sqlx::query(
        r#"
        SELECT id, segment_id, variant_id, variant_key, percent
        FROM distributions
        ORDER BY segment_id, id
        "#,
    )
    .fetch_all(&mut *tx)
    .await?
    .iter()
    .map(|row| -> StorageResult<DistributionRow> {
        Ok(DistributionRow {
            id: row.try_get("id")?,
            segment_id: row.try_get("segment_id")?,
            variant_id: row.try_get("variant_id")?,
            variant_key: row.try_get("variant_key")?,
            percent: row.try_get("percent")?,
        })
    })
    .collect::<StorageResult<Vec<_>>>()?;

    tx.commit().await?;

    assemble(
        flag_rows,
        variant_rows,
        segment_rows,
        constraint_rows,
        distribution_rows,
    )
}
