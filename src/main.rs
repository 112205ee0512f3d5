use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use morbidity_scraper::api::{create_router, AppState};
use morbidity_scraper::config::Config;
use morbidity_scraper::db::{SeriesRepository, SeriesStore};
use morbidity_scraper::fetcher::PageFetcher;
use morbidity_scraper::self_check;
use morbidity_scraper::services::{ScrapeService, SeriesService};

#[derive(Parser)]
#[command(name = "morbidity-scraper")]
#[command(about = "Scrape SIH/SUS hospital morbidity series from TabNet", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape every configured month and upsert the series
    Process,
    /// Run the embedded self-checks against an in-memory store.
    ///
    /// Unlike `process` and `serve`, this does not load config.json, so it
    /// works without a config file, network or database.
    Test,
    /// Serve the stored series over HTTP
    Serve,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,morbidity_scraper=debug")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .init();

    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match cli.command {
        Command::Test => self_check::run().await?,
        Command::Process => {
            let config = Config::load()?;
            let pool = connect(&config).await?;
            process(config, pool).await?;
        }
        Command::Serve => {
            let config = Config::load()?;
            let pool = connect(&config).await?;
            serve(config, pool).await?;
        }
    }

    Ok(())
}

async fn connect(config: &Config) -> Result<PgPool, Box<dyn std::error::Error>> {
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_uri)
        .await?;
    info!("Database connection established");

    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations completed");

    Ok(pool)
}

async fn process(config: Config, pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
    let fetcher = PageFetcher::new(
        config.data_url.clone(),
        &config.reference_url,
        config.request_timeout(),
    )?;
    let store = SeriesStore::new(SeriesRepository::new(pool), config.batch_size);

    info!(
        "Scraping {} to {} from {}",
        config.start_year, config.end_year, config.data_url
    );
    let summary = ScrapeService::new(fetcher, store)
        .with_progress(ProgressBar::new(0))
        .run(config.years())
        .await?;

    info!(
        "Done: {} series from {} rows over {} months",
        summary.series, summary.rows, summary.months_scraped
    );
    Ok(())
}

async fn serve(config: Config, pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
    let series_service = SeriesService::new(SeriesRepository::new(pool));
    let app = create_router(AppState { series_service }).layer(TraceLayer::new_for_http());

    let addr = config.server_addr();
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
