use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::FieldMap;

pub const MORBIDITY: &str = "Epilepsia";
pub const SEX: &str = "Feminino";
pub const SOURCE: &str = "SUS";
pub const VARIABLE: &str = "Morbidade Hospitalar";

/// Descriptive metadata stored under a series' `fields` document.
///
/// Field names are the Portuguese keys the series API filters on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSet {
    #[serde(rename = "município_nom")]
    pub municipality_name: String,
    #[serde(rename = "faixa_etária")]
    pub age_bracket: String,
    /// None for the "Total" aggregate row
    #[serde(rename = "município_cod")]
    pub municipality_code: Option<String>,
    #[serde(rename = "morbidade")]
    pub morbidity: String,
    #[serde(rename = "sexo")]
    pub sex: String,
    pub source: String,
    pub variable: String,
    pub description: String,
}

impl FieldSet {
    pub fn new(
        municipality_name: impl Into<String>,
        age_bracket: impl Into<String>,
        municipality_code: Option<String>,
    ) -> Self {
        let municipality_name = municipality_name.into();
        let age_bracket = age_bracket.into();
        let description = format!(
            "{SOURCE} - Morbidade, {MORBIDITY}, {SEX}, {age_bracket}, {municipality_name}"
        );

        Self {
            municipality_name,
            age_bracket,
            municipality_code,
            morbidity: MORBIDITY.to_string(),
            sex: SEX.to_string(),
            source: SOURCE.to_string(),
            variable: VARIABLE.to_string(),
            description,
        }
    }

    /// Flatten the serialized form into the name → value mapping written by `add_fields`
    pub fn to_map(&self) -> FieldMap {
        match serde_json::to_value(self) {
            Ok(Value::Object(object)) => object
                .into_iter()
                .map(|(key, value)| (key, value.as_str().map(str::to_string)))
                .collect(),
            _ => FieldMap::new(),
        }
    }
}
