use tracing::instrument;

use crate::db::{BatchWriter, BulkWriteResult, DbError, DocumentStore, FieldMap, PointMap, UpsertOp};
use crate::series::Point;

/// Upsert-by-uid access to series documents, batched on the client side.
///
/// Points are normalized to UTC before they are keyed by epoch seconds.
pub struct SeriesStore<S> {
    batch: BatchWriter<S>,
}

impl<S: DocumentStore> SeriesStore<S> {
    pub fn new(store: S, batch_size: usize) -> Self {
        Self {
            batch: BatchWriter::new(store, batch_size),
        }
    }

    pub fn batch(&self) -> &BatchWriter<S> {
        &self.batch
    }

    /// Set `points.<timestamp> = value` on `uid`
    pub async fn add_point(&mut self, uid: &str, point: &Point) -> Result<(), DbError> {
        self.add_points(uid, std::slice::from_ref(point)).await
    }

    /// Merge several points at once; later points win on equal timestamps
    pub async fn add_points(&mut self, uid: &str, points: &[Point]) -> Result<(), DbError> {
        let points: PointMap = points
            .iter()
            .map(|point| {
                let (timestamp, value) = point.to_utc().as_raw_tuple();
                (timestamp.to_string(), value)
            })
            .collect();

        self.enqueue(UpsertOp::SetPoints {
            uid: uid.to_string(),
            points,
        })
        .await
    }

    /// Merge `fields` into the `fields` document of `uid`
    pub async fn add_fields(&mut self, uid: &str, fields: FieldMap) -> Result<(), DbError> {
        self.enqueue(UpsertOp::SetFields {
            uid: uid.to_string(),
            fields,
        })
        .await
    }

    async fn enqueue(&mut self, op: UpsertOp) -> Result<(), DbError> {
        self.batch.enqueue(op).await
    }

    /// Write whatever is still pending
    #[instrument(skip(self))]
    pub async fn flush(&mut self) -> Result<BulkWriteResult, DbError> {
        self.batch.flush().await
    }
}
