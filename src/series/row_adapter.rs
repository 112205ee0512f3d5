use chrono::NaiveDateTime;
use tracing::debug;

use super::{FieldSet, Point, Series};

/// Column holding "<code> <name>" or "Total"
pub const CITY_KEY: &str = "Município";

/// Marker TabNet writes for "no observation"
const NO_DATA: &str = "-";

/// One CSV row as (column label, cell) pairs, in header order
pub type CsvRow = Vec<(String, String)>;

#[derive(Debug, thiserror::Error)]
pub enum RowError {
    #[error("Row has no '{0}' column")]
    MissingColumn(&'static str),
    #[error("Invalid value '{value}' in column '{column}' for {city}")]
    InvalidNumber {
        city: String,
        column: String,
        value: String,
    },
}

/// Split a municipality cell into (code, name).
///
/// `"530010 Brasília"` → `(Some("530010"), "Brasília")`, `"Total"` → `(None, "Total")`.
pub fn parse_city(value: &str) -> (Option<String>, String) {
    let mut parts = value.splitn(2, ' ');
    let code = parts.next().unwrap_or_default();
    let name = parts.next().unwrap_or_default();

    if code == "Total" {
        (None, code.to_string())
    } else {
        (Some(code.to_string()), name.to_string())
    }
}

/// Turns one row of the morbidity export into Series, one per age bracket.
///
/// Cells are converted as the iterator is advanced. Once exhausted it yields
/// nothing more; build a new adapter for every row.
pub struct CsvRowAdapter {
    cells: std::vec::IntoIter<(String, String)>,
    datetime: NaiveDateTime,
    city_code: Option<String>,
    city_name: String,
}

impl CsvRowAdapter {
    pub fn new<K, V>(
        row: impl IntoIterator<Item = (K, V)>,
        datetime: NaiveDateTime,
    ) -> Result<Self, RowError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let row: CsvRow = row
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let city = row
            .iter()
            .find(|(label, _)| label == CITY_KEY)
            .map(|(_, value)| value.as_str())
            .ok_or(RowError::MissingColumn(CITY_KEY))?;
        let (city_code, city_name) = parse_city(city);

        Ok(Self {
            cells: row.into_iter(),
            datetime,
            city_code,
            city_name,
        })
    }

    pub fn city_name(&self) -> &str {
        &self.city_name
    }

    pub fn city_code(&self) -> Option<&str> {
        self.city_code.as_deref()
    }

    fn build_series(&self, age_bracket: String, raw: &str) -> Result<Series, RowError> {
        let value = raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| RowError::InvalidNumber {
                city: self.city_name.clone(),
                column: age_bracket.clone(),
                value: raw.to_string(),
            })?;

        let fields = FieldSet::new(self.city_name.clone(), age_bracket, self.city_code.clone());
        Ok(Series::new(Point::naive(self.datetime, value), fields))
    }
}

impl Iterator for CsvRowAdapter {
    type Item = Result<Series, RowError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((label, raw)) = self.cells.next() {
            if label == CITY_KEY {
                continue;
            }
            if raw.is_empty() || raw == NO_DATA {
                debug!("Skipping empty cell {} for {}", label, self.city_name);
                continue;
            }
            return Some(self.build_series(label, &raw));
        }
        None
    }
}
