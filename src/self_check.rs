// Embedded checks behind the `test` entry point.
//
// They exercise the pure parts of the pipeline against an in-memory document
// store, so they run without network or database access.

use chrono::{NaiveDate, NaiveTime};
use tracing::{error, info};

use crate::db::{MemoryStore, SeriesStore, DEFAULT_BATCH_SIZE};
use crate::fetcher::{extract_csv, file_names, PageFetcher, DATA_URL, DEFAULT_TIMEOUT, REFERENCE_URL};
use crate::series::{parse_city, CsvRowAdapter, Point, Series};
use crate::services::ScrapeService;

#[derive(Debug, thiserror::Error)]
#[error("{} self-check(s) failed: {}", .failures.len(), .failures.join("; "))]
pub struct SelfCheckError {
    pub failures: Vec<String>,
}

type CheckResult = Result<(), String>;

fn ensure(condition: bool, message: impl FnOnce() -> String) -> CheckResult {
    if condition {
        Ok(())
    } else {
        Err(message())
    }
}

fn first_of(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or_default()
}

fn check_file_names() -> CheckResult {
    let names = file_names(&[first_of(2020, 1), first_of(2020, 3)]);
    ensure(names == ["nibr2001.dbf", "nibr2003.dbf"], || {
        format!("unexpected file names {names:?}")
    })
}

fn check_parse_city() -> CheckResult {
    let cases = [
        ("111 Br", Some("111"), "Br"),
        ("111 Rio de Janeiro", Some("111"), "Rio de Janeiro"),
        ("Total", None, "Total"),
    ];
    for (input, code, name) in cases {
        let (parsed_code, parsed_name) = parse_city(input);
        ensure(parsed_code.as_deref() == code && parsed_name == name, || {
            format!("parse_city({input:?}) gave ({parsed_code:?}, {parsed_name:?})")
        })?;
    }
    Ok(())
}

fn check_row_skips_placeholders() -> CheckResult {
    let row = [("Município", "Total"), ("0-4", "-"), ("5-9", ""), ("10+", "7")];
    let datetime = first_of(2020, 1).and_time(NaiveTime::MIN);
    let series: Vec<Series> = CsvRowAdapter::new(row, datetime)
        .map_err(|e| e.to_string())?
        .collect::<Result<_, _>>()
        .map_err(|e| e.to_string())?;

    ensure(
        series.len() == 1 && series[0].fields.age_bracket == "10+" && series[0].point.value == 7.0,
        || format!("expected one 10+ series with value 7, got {series:?}"),
    )
}

fn check_to_utc_idempotent() -> CheckResult {
    let point = Point::naive(first_of(2015, 7).and_time(NaiveTime::MIN), 1.5);
    ensure(point.to_utc().to_utc() == point.to_utc(), || {
        "to_utc is not idempotent".to_string()
    })
}

async fn check_add_point_idempotent() -> CheckResult {
    let memory = MemoryStore::new();
    let mut store = SeriesStore::new(memory.clone(), DEFAULT_BATCH_SIZE);
    let point = Point::naive(first_of(2012, 2).and_time(NaiveTime::MIN), 3.0);

    store.add_point("check", &point).await.map_err(|e| e.to_string())?;
    store.flush().await.map_err(|e| e.to_string())?;
    let before = memory.get("check").await;

    store.add_point("check", &point).await.map_err(|e| e.to_string())?;
    store.flush().await.map_err(|e| e.to_string())?;
    let after = memory.get("check").await;

    ensure(before.is_some() && before == after, || {
        format!("document changed from {before:?} to {after:?}")
    })
}

async fn check_end_to_end() -> CheckResult {
    let html = "<html><body><pre>\r\nMunicípio;0-4\n111 Foo;42\n</pre></body></html>";
    let csv = extract_csv(html).ok_or("no <pre> found in synthetic page")?;

    let memory = MemoryStore::new();
    let fetcher = PageFetcher::new(DATA_URL.to_string(), REFERENCE_URL, DEFAULT_TIMEOUT)
        .map_err(|e| e.to_string())?;
    let mut service = ScrapeService::new(fetcher, SeriesStore::new(memory.clone(), DEFAULT_BATCH_SIZE));

    let (_, series) = service
        .store_csv(&csv, first_of(2020, 1).and_time(NaiveTime::MIN))
        .await
        .map_err(|e| e.to_string())?;
    service.flush().await.map_err(|e| e.to_string())?;

    let documents = memory.documents().await;
    ensure(series == 1 && documents.len() == 1, || {
        format!("expected one series, got {documents:?}")
    })?;

    let doc = &documents[0];
    ensure(
        doc.uid.ends_with("\\Foo\\0-4")
            && doc.points.values().eq([42.0].iter())
            && doc.fields.get("município_cod") == Some(&Some("111".to_string())),
        || format!("unexpected document {doc:?}"),
    )
}

/// Run every check, logging each outcome
pub async fn run() -> Result<(), SelfCheckError> {
    let results = [
        ("file names", check_file_names()),
        ("city parsing", check_parse_city()),
        ("placeholder cells", check_row_skips_placeholders()),
        ("UTC normalization", check_to_utc_idempotent()),
        ("idempotent add_point", check_add_point_idempotent().await),
        ("end to end", check_end_to_end().await),
    ];

    let mut failures = Vec::new();
    for (name, result) in results {
        match result {
            Ok(()) => info!("✓ {}", name),
            Err(e) => {
                error!("✗ {}: {}", name, e);
                failures.push(format!("{name}: {e}"));
            }
        }
    }

    if failures.is_empty() {
        info!("All self-checks passed");
        Ok(())
    } else {
        Err(SelfCheckError { failures })
    }
}
