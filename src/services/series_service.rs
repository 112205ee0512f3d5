use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::{DbError, SeriesDocument, SeriesFilter, SeriesRepository};

// Query-string parameters of GET /series
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeriesParams {
    pub query: Option<String>,
    pub len: Option<i64>,
    /// Comma-separated field names
    pub distinct: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("len must be -1 or higher, got {0}")]
    InvalidLen(i64),
    #[error("Query term '{0}' is not of the form key=value")]
    MalformedTerm(String),
}

/// How many series a request wants back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestLen {
    Unlimited,
    Nothing,
    Limit(i64),
}

impl RequestLen {
    pub fn parse(len: i64) -> Result<Self, RequestError> {
        match len {
            -1 => Ok(RequestLen::Unlimited),
            0 => Ok(RequestLen::Nothing),
            n if n > 0 => Ok(RequestLen::Limit(n)),
            n => Err(RequestError::InvalidLen(n)),
        }
    }

    /// SQL LIMIT, or None when no series were requested
    fn limit(self) -> Option<Option<i64>> {
        match self {
            RequestLen::Unlimited => Some(None),
            RequestLen::Nothing => None,
            RequestLen::Limit(n) => Some(Some(n)),
        }
    }
}

/// Split a query like `uid=x município_nom="Rio de Janeiro"` into a filter.
///
/// Terms are separated by whitespace outside quotes (`"`, `'` or `` ` ``);
/// double quotes are then dropped. A value ends at the next `=`, so
/// `a=b=c` filters `a` on `b`. `uid` matches the document id, every other
/// key a `fields` entry.
pub fn parse_query_string(query: &str) -> Result<SeriesFilter, RequestError> {
    let mut filter = SeriesFilter::default();

    for term in split_terms(query) {
        let mut parts = term.split('=');
        let key = parts.next().unwrap_or_default();
        let value = parts
            .next()
            .ok_or_else(|| RequestError::MalformedTerm(term.clone()))?;

        if key == "uid" {
            filter.uid = Some(value.to_string());
        } else {
            filter.fields.insert(key.to_string(), value.to_string());
        }
    }

    Ok(filter)
}

fn split_terms(query: &str) -> Vec<String> {
    let mut terms = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in query.chars() {
        match quote {
            None if matches!(ch, '"' | '\'' | '`') => quote = Some(ch),
            Some(open) if ch == open => quote = None,
            None if ch.is_whitespace() => {
                if !current.is_empty() {
                    terms.push(std::mem::take(&mut current));
                }
                continue;
            }
            _ => {}
        }
        if ch != '"' {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        terms.push(current);
    }

    terms
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRequest {
    pub filter: SeriesFilter,
    pub len: RequestLen,
    pub distinct: Vec<String>,
}

impl SeriesRequest {
    pub fn from_params(params: &SeriesParams) -> Result<Self, RequestError> {
        let filter = parse_query_string(params.query.as_deref().unwrap_or_default())?;
        let len = RequestLen::parse(params.len.unwrap_or(-1))?;
        let distinct = params
            .distinct
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            filter,
            len,
            distinct,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<SeriesDocument>>,
    /// Total number of matching documents, regardless of `len`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub len: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distinct: Option<BTreeMap<String, Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SeriesResponse {
    pub fn failure(error: impl ToString) -> Self {
        Self {
            success: false,
            content: None,
            len: None,
            distinct: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct SeriesService {
    series_repo: SeriesRepository,
}

impl SeriesService {
    pub fn new(series_repo: SeriesRepository) -> Self {
        Self { series_repo }
    }

    pub async fn run_query(&self, request: &SeriesRequest) -> Result<SeriesResponse, DbError> {
        let mut response = SeriesResponse {
            success: true,
            content: None,
            len: None,
            distinct: None,
            error: None,
        };

        if let Some(limit) = request.len.limit() {
            let series = self.series_repo.find(&request.filter, limit).await?;
            let total = self.series_repo.count(&request.filter).await?;
            debug!("Query matched {} series, returning {}", total, series.len());
            response.content = Some(series);
            response.len = Some(total);
        }

        if !request.distinct.is_empty() {
            let mut distinct = BTreeMap::new();
            for field in &request.distinct {
                let values = self.series_repo.distinct(field, &request.filter).await?;
                distinct.insert(field.clone(), values);
            }
            response.distinct = Some(distinct);
        }

        Ok(response)
    }
}
