pub mod api;
pub mod config;
pub mod db;
pub mod fetch_error;
pub mod fetcher;
pub mod self_check;
pub mod series;
pub mod services;
