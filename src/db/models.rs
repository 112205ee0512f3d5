use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;

/// `points` sub-document: epoch seconds (as string keys) → value
pub type PointMap = BTreeMap<String, f64>;

/// `fields` sub-document: field name → value (null when unknown)
pub type FieldMap = BTreeMap<String, Option<String>>;

/// A pending upsert against one series document.
///
/// Both variants merge their keys into the existing sub-document and create
/// the document when the uid is unseen.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOp {
    SetPoints { uid: String, points: PointMap },
    SetFields { uid: String, fields: FieldMap },
}

impl UpsertOp {
    pub fn uid(&self) -> &str {
        match self {
            UpsertOp::SetPoints { uid, .. } | UpsertOp::SetFields { uid, .. } => uid,
        }
    }
}

/// Outcome of one bulk write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkWriteResult {
    pub upserted: usize,
    pub modified: usize,
}

impl BulkWriteResult {
    pub fn total(&self) -> usize {
        self.upserted + self.modified
    }
}

// Stored document, as returned by the series API
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeriesDocument {
    pub uid: String,
    pub points: PointMap,
    pub fields: FieldMap,
}

impl SeriesDocument {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            ..Default::default()
        }
    }

    /// Merge an upsert into this document
    pub fn apply(&mut self, op: &UpsertOp) {
        match op {
            UpsertOp::SetPoints { points, .. } => {
                self.points
                    .extend(points.iter().map(|(k, v)| (k.clone(), *v)));
            }
            UpsertOp::SetFields { fields, .. } => {
                self.fields
                    .extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct SeriesRow {
    pub id: String,
    pub points: Json<PointMap>,
    pub fields: Json<FieldMap>,
}

impl From<SeriesRow> for SeriesDocument {
    fn from(row: SeriesRow) -> Self {
        Self {
            uid: row.id,
            points: row.points.0,
            fields: row.fields.0,
        }
    }
}

/// Document filter: optional exact uid plus `fields` equality constraints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesFilter {
    pub uid: Option<String>,
    pub fields: BTreeMap<String, String>,
}
