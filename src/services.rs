pub mod scrape_service;
pub mod series_service;

pub use scrape_service::{ScrapeError, ScrapeService, ScrapeSummary};
pub use series_service::SeriesService;
