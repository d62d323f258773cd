//! # News Scraper
//!
//! Scrapes headline/link pairs from a news front page into a local document
//! store and serves them over a small REST API, where each article can carry
//! one free-form note.
//!
//! ## Usage
//!
//! ```sh
//! news_scraper --port 3000 --database data/news_scraper
//! curl localhost:3000/scrape
//! curl localhost:3000/api/articles
//! ```
//!
//! ## Architecture
//!
//! 1. **Scraping**: `/scrape` fetches the front page once and extracts every
//!    `article h2` headline
//! 2. **Persistence**: each headline becomes an article in the sled-backed
//!    document store
//! 3. **API**: articles are listed, fetched with their note resolved, and
//!    annotated with notes over HTTP

use clap::Parser;
use std::error::Error;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod models;
mod scrapers;
mod store;
#[cfg(test)]
mod testing;
mod utils;

use api::AppState;
use cli::Cli;
use store::Store;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    info!("news_scraper starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let store = Store::open(&args.database)?;
    let state = AppState {
        store,
        client: reqwest::Client::new(),
        source_url: args.source_url.clone(),
        insert_mode: args.insert_mode(),
    };
    let app = api::router(state, &args.public_dir);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr).await?;
    info!(
        %addr,
        source = %args.source_url,
        public_dir = %args.public_dir.display(),
        insert_mode = ?args.insert_mode(),
        "App running on http://localhost:{}",
        args.port
    );

    axum::serve(listener, app).await?;
    Ok(())
}
