use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{BulkWriteResult, DbError, DocumentStore, SeriesDocument, UpsertOp};

/// In-process document store with the same merge semantics as PostgreSQL.
///
/// Clones share the same documents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    documents: Arc<Mutex<BTreeMap<String, SeriesDocument>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, uid: &str) -> Option<SeriesDocument> {
        self.documents.lock().await.get(uid).cloned()
    }

    pub async fn len(&self) -> usize {
        self.documents.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.lock().await.is_empty()
    }

    pub async fn documents(&self) -> Vec<SeriesDocument> {
        self.documents.lock().await.values().cloned().collect()
    }
}

impl DocumentStore for MemoryStore {
    async fn bulk_upsert(&self, ops: &[UpsertOp]) -> Result<BulkWriteResult, DbError> {
        let mut documents = self.documents.lock().await;
        let mut result = BulkWriteResult::default();

        for op in ops {
            match documents.get_mut(op.uid()) {
                Some(doc) => {
                    doc.apply(op);
                    result.modified += 1;
                }
                None => {
                    let mut doc = SeriesDocument::new(op.uid());
                    doc.apply(op);
                    documents.insert(op.uid().to_string(), doc);
                    result.upserted += 1;
                }
            }
        }

        Ok(result)
    }
}
