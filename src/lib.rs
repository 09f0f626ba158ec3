pub mod export;
pub mod models;
pub mod scrape;
