use std::ops::RangeInclusive;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, instrument};

use crate::db::{DbError, DocumentStore, SeriesStore};
use crate::fetch_error::FetchError;
use crate::fetcher::PageFetcher;
use crate::series::{CsvRow, CsvRowAdapter, RowError};

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Row(#[from] RowError),
    #[error(transparent)]
    Db(#[from] DbError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrapeSummary {
    pub months_scraped: usize,
    pub months_skipped: usize,
    pub rows: usize,
    pub series: usize,
}

/// First day of every month of `years`, in order
pub fn months(years: RangeInclusive<i32>) -> impl Iterator<Item = NaiveDate> {
    years.flat_map(|year| (1..=12).filter_map(move |month| NaiveDate::from_ymd_opt(year, month, 1)))
}

/// Parse a `;`-delimited export whose first line holds the column labels
pub fn parse_csv(text: &str) -> Result<Vec<CsvRow>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();

    for record in reader.records() {
        let record = record?;
        let row: CsvRow = headers
            .iter()
            .zip(record.iter())
            .map(|(label, cell)| (label.to_string(), cell.to_string()))
            .collect();
        rows.push(row);
    }

    Ok(rows)
}

/// Scrapes the month grid sequentially and stores every series it finds
pub struct ScrapeService<S> {
    fetcher: PageFetcher,
    store: SeriesStore<S>,
    progress: ProgressBar,
}

impl<S: DocumentStore> ScrapeService<S> {
    pub fn new(fetcher: PageFetcher, store: SeriesStore<S>) -> Self {
        Self {
            fetcher,
            store,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        progress.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        self.progress = progress;
        self
    }

    pub fn store(&self) -> &SeriesStore<S> {
        &self.store
    }

    /// Scrape every month of `years`, then flush whatever is still batched.
    ///
    /// The first fatal error aborts the run; months already flushed stay written.
    #[instrument(skip(self))]
    pub async fn run(&mut self, years: RangeInclusive<i32>) -> Result<ScrapeSummary, ScrapeError> {
        let dates: Vec<NaiveDate> = months(years).collect();
        self.progress.set_length(dates.len() as u64);
        let mut summary = ScrapeSummary::default();

        for date in dates {
            self.progress
                .set_message(format!("{}/{:02}", date.year(), date.month()));

            match self.scrape_month(date).await? {
                Some((rows, series)) => {
                    summary.months_scraped += 1;
                    summary.rows += rows;
                    summary.series += series;
                }
                None => summary.months_skipped += 1,
            }
            self.progress.inc(1);
        }

        let result = self.store.flush().await?;
        debug!("Final flush wrote {} operations", result.total());

        self.progress.finish_with_message(format!(
            "✓ {} months scraped, {} without data",
            summary.months_scraped, summary.months_skipped
        ));
        info!(
            "Scrape finished: {} months, {} rows, {} series ({} months without data)",
            summary.months_scraped, summary.rows, summary.series, summary.months_skipped
        );
        Ok(summary)
    }

    /// Fetch and store one month. Returns None when TabNet has no data for it,
    /// otherwise the number of rows and series processed.
    pub async fn scrape_month(&mut self, date: NaiveDate) -> Result<Option<(usize, usize)>, ScrapeError> {
        info!("Scraping {}/{}", date.year(), date.month());

        let Some(csv) = self.fetcher.fetch_csv(&[date]).await? else {
            info!("No data found in page for {}/{}", date.year(), date.month());
            return Ok(None);
        };

        let datetime = date.and_time(NaiveTime::MIN);
        let counts = self.store_csv(&csv, datetime).await?;
        info!("Saved {} series from {} rows", counts.1, counts.0);
        Ok(Some(counts))
    }

    /// Adapt every row of an export and queue its points and fields
    pub async fn store_csv(
        &mut self,
        csv: &str,
        datetime: NaiveDateTime,
    ) -> Result<(usize, usize), ScrapeError> {
        let rows = parse_csv(csv)?;
        let mut series_count = 0;

        for row in &rows {
            for series in CsvRowAdapter::new(row.iter().cloned(), datetime)? {
                let series = series?;
                self.store.add_point(&series.uid, &series.point).await?;
                self.store.add_fields(&series.uid, series.fields.to_map()).await?;
                series_count += 1;
            }
        }

        debug!("Queued {} series from {} rows", series_count, rows.len());
        Ok((rows.len(), series_count))
    }

    /// Flush anything still queued
    pub async fn flush(&mut self) -> Result<(), ScrapeError> {
        self.store.flush().await?;
        Ok(())
    }
}
