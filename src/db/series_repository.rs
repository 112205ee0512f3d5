use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, error, info, instrument};

use crate::db::models::SeriesRow;
use crate::db::{BulkWriteResult, DbError, DocumentStore, SeriesDocument, SeriesFilter, UpsertOp};

const FILTER: &str = "($1::text IS NULL OR id = $1::text) AND fields @> $2";

/// `distinct` name that asks for the field keys rather than one field's values
pub const FIELD_KEYS: &str = "fields";

#[derive(Clone)]
pub struct SeriesRepository {
    pool: PgPool,
}

impl SeriesRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply upserts in one transaction.
    ///
    /// `points`/`fields` keys are merged into the stored JSONB, never replaced wholesale.
    #[instrument(skip(self, ops), fields(count = ops.len()))]
    pub async fn upsert_many(&self, ops: &[UpsertOp]) -> Result<BulkWriteResult, DbError> {
        debug!("Beginning transaction to upsert {} operations", ops.len());
        let mut tx = self.pool.begin().await?;
        let mut result = BulkWriteResult::default();

        for op in ops {
            let query = match op {
                UpsertOp::SetPoints { uid, points } => sqlx::query_scalar::<_, bool>(
                    r#"
                    INSERT INTO series (id, points)
                    VALUES ($1, $2)
                    ON CONFLICT (id) DO UPDATE SET
                        points = series.points || EXCLUDED.points,
                        updated_at = NOW()
                    RETURNING (xmax = 0) AS inserted
                    "#,
                )
                .bind(uid)
                .bind(Json(points)),
                UpsertOp::SetFields { uid, fields } => sqlx::query_scalar::<_, bool>(
                    r#"
                    INSERT INTO series (id, fields)
                    VALUES ($1, $2)
                    ON CONFLICT (id) DO UPDATE SET
                        fields = series.fields || EXCLUDED.fields,
                        updated_at = NOW()
                    RETURNING (xmax = 0) AS inserted
                    "#,
                )
                .bind(uid)
                .bind(Json(fields)),
            };

            let inserted = query.fetch_one(&mut *tx).await.map_err(|e| {
                error!(uid = %op.uid(), error = %e, "Failed to upsert series document");
                e
            })?;

            if inserted {
                result.upserted += 1;
            } else {
                result.modified += 1;
            }
        }

        tx.commit().await?;
        info!(
            "Upserted {} new series documents, updated {}",
            result.upserted, result.modified
        );
        Ok(result)
    }

    #[instrument(skip(self), fields(uid = %uid))]
    pub async fn find_by_id(&self, uid: &str) -> Result<Option<SeriesDocument>, DbError> {
        let row = sqlx::query_as::<_, SeriesRow>(
            "SELECT id, points, fields FROM series WHERE id = $1",
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SeriesDocument::from))
    }

    /// Documents matching `filter`, ordered by uid; `limit = None` means no limit
    #[instrument(skip(self))]
    pub async fn find(
        &self,
        filter: &SeriesFilter,
        limit: Option<i64>,
    ) -> Result<Vec<SeriesDocument>, DbError> {
        let sql = format!(
            "SELECT id, points, fields FROM series WHERE {FILTER} ORDER BY id LIMIT $3"
        );
        let rows = sqlx::query_as::<_, SeriesRow>(&sql)
            .bind(filter.uid.as_deref())
            .bind(Json(&filter.fields))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        debug!("Found {} series", rows.len());
        Ok(rows.into_iter().map(SeriesDocument::from).collect())
    }

    #[instrument(skip(self))]
    pub async fn count(&self, filter: &SeriesFilter) -> Result<i64, DbError> {
        let sql = format!("SELECT COUNT(*) FROM series WHERE {FILTER}");
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(filter.uid.as_deref())
            .bind(Json(&filter.fields))
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Distinct non-null values of `fields.<field>` among matching documents.
    ///
    /// The name `fields` itself lists the distinct field keys instead.
    #[instrument(skip(self))]
    pub async fn distinct(&self, field: &str, filter: &SeriesFilter) -> Result<Vec<String>, DbError> {
        if field == FIELD_KEYS {
            return self.distinct_keys(filter).await;
        }

        let sql = format!(
            "SELECT DISTINCT fields->>$3::text AS value FROM series \
             WHERE {FILTER} AND fields->>$3::text IS NOT NULL ORDER BY value"
        );
        let values = sqlx::query_scalar::<_, String>(&sql)
            .bind(filter.uid.as_deref())
            .bind(Json(&filter.fields))
            .bind(field)
            .fetch_all(&self.pool)
            .await?;

        debug!("Found {} distinct values for {}", values.len(), field);
        Ok(values)
    }

    async fn distinct_keys(&self, filter: &SeriesFilter) -> Result<Vec<String>, DbError> {
        let sql = format!(
            "SELECT DISTINCT jsonb_object_keys(fields) AS name FROM series \
             WHERE {FILTER} ORDER BY name"
        );
        let keys = sqlx::query_scalar::<_, String>(&sql)
            .bind(filter.uid.as_deref())
            .bind(Json(&filter.fields))
            .fetch_all(&self.pool)
            .await?;

        debug!("Found {} distinct field keys", keys.len());
        Ok(keys)
    }
}

impl DocumentStore for SeriesRepository {
    async fn bulk_upsert(&self, ops: &[UpsertOp]) -> Result<BulkWriteResult, DbError> {
        self.upsert_many(ops).await
    }
}
