// Series model for the SIH hospital morbidity tabulation
//
// Every cell of a TabNet export becomes one Series: a deterministic uid, the
// observation for that month and the metadata describing the slice.

pub mod fields;
pub mod point;
pub mod row_adapter;

pub use fields::FieldSet;
pub use point::{Point, PointTime};
pub use row_adapter::{parse_city, CsvRow, CsvRowAdapter, RowError, CITY_KEY};

/// Namespace shared by every series written by this scraper
pub const SERIES_PREFIX: &str = "SUS\\Morbidade Hospitalar";

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub uid: String,
    pub point: Point,
    pub fields: FieldSet,
}

impl Series {
    pub fn new(point: Point, fields: FieldSet) -> Self {
        Self {
            uid: series_uid(&fields.municipality_name, &fields.age_bracket),
            point,
            fields,
        }
    }
}

/// Build the uid for a (city, age bracket) pair.
///
/// Layout: `<prefix>\<morbidity>\<sex>\<city>\<age bracket>`
pub fn series_uid(city_name: &str, age_bracket: &str) -> String {
    [
        SERIES_PREFIX,
        fields::MORBIDITY,
        fields::SEX,
        city_name,
        age_bracket,
    ]
    .join("\\")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_series_uid_layout() {
        assert_eq!(
            series_uid("Rio de Janeiro", "20 a 29 anos"),
            "SUS\\Morbidade Hospitalar\\Epilepsia\\Feminino\\Rio de Janeiro\\20 a 29 anos"
        );
    }

    #[test]
    fn test_series_uid_is_deterministic() {
        let dt = NaiveDate::from_ymd_opt(2019, 5, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let a = Series::new(
            Point::naive(dt, 1.0),
            FieldSet::new("Foo", "0-4", Some("111".to_string())),
        );
        let b = Series::new(
            Point::naive(dt, 2.0),
            FieldSet::new("Foo", "0-4", Some("111".to_string())),
        );
        assert_eq!(a.uid, b.uid);
    }
}
