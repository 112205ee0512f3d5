use std::future::Future;

use tracing::{debug, info, instrument};

use crate::db::{BulkWriteResult, DbError, UpsertOp};

/// Pending operations are written once the batch grows past this size
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Backend able to apply a batch of upserts in one call.
///
/// Every operation is applied on its own; the batch as a whole is not atomic.
/// Any reported failure is returned as an error.
pub trait DocumentStore {
    fn bulk_upsert(
        &self,
        ops: &[UpsertOp],
    ) -> impl Future<Output = Result<BulkWriteResult, DbError>> + Send;
}

/// Client-side buffer of upserts, written to the store in bulk
pub struct BatchWriter<S> {
    store: S,
    pending: Vec<UpsertOp>,
    threshold: usize,
    written: usize,
}

impl<S: DocumentStore> BatchWriter<S> {
    pub fn new(store: S, threshold: usize) -> Self {
        Self {
            store,
            pending: Vec::new(),
            threshold,
            written: 0,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Operations acknowledged by the store so far
    pub fn written(&self) -> usize {
        self.written
    }

    /// Queue an operation, writing the batch when it exceeds the threshold
    pub async fn enqueue(&mut self, op: UpsertOp) -> Result<(), DbError> {
        self.pending.push(op);
        if self.pending.len() > self.threshold {
            info!("Unloading batch of {} operations", self.pending.len());
            self.flush().await?;
        }
        Ok(())
    }

    /// Write every pending operation. The buffer is only cleared on success.
    #[instrument(skip(self), fields(pending = self.pending.len()))]
    pub async fn flush(&mut self) -> Result<BulkWriteResult, DbError> {
        if self.pending.is_empty() {
            debug!("Nothing to flush");
            return Ok(BulkWriteResult::default());
        }

        let result = self.store.bulk_upsert(&self.pending).await?;
        self.written += self.pending.len();
        self.pending.clear();

        debug!(
            "Batch written: {} upserted, {} modified",
            result.upserted, result.modified
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use std::collections::BTreeMap;

    fn op(uid: &str, ts: i64) -> UpsertOp {
        UpsertOp::SetPoints {
            uid: uid.to_string(),
            points: BTreeMap::from([(ts.to_string(), 1.0)]),
        }
    }

    #[tokio::test]
    async fn test_flushes_only_past_threshold() {
        let mut writer = BatchWriter::new(MemoryStore::new(), 3);

        for ts in 0..3 {
            writer.enqueue(op("a", ts)).await.unwrap();
        }
        assert_eq!(writer.pending_len(), 3);
        assert_eq!(writer.store().len().await, 0);

        writer.enqueue(op("a", 3)).await.unwrap();
        assert_eq!(writer.pending_len(), 0);
        assert_eq!(writer.written(), 4);
        assert_eq!(writer.store().get("a").await.unwrap().points.len(), 4);
    }

    #[tokio::test]
    async fn test_explicit_flush_writes_tail() {
        let mut writer = BatchWriter::new(MemoryStore::new(), DEFAULT_BATCH_SIZE);
        writer.enqueue(op("a", 1)).await.unwrap();
        writer.enqueue(op("b", 1)).await.unwrap();

        let result = writer.flush().await.unwrap();
        assert_eq!(result.upserted, 2);
        assert_eq!(writer.pending_len(), 0);
        assert_eq!(writer.store().len().await, 2);
    }

    #[tokio::test]
    async fn test_flush_empty_batch_is_noop() {
        let mut writer = BatchWriter::new(MemoryStore::new(), DEFAULT_BATCH_SIZE);
        let result = writer.flush().await.unwrap();
        assert_eq!(result, BulkWriteResult::default());
    }
}
