//! Command-line interface definitions for the news scraper server.
//!
//! Every option has a default, so the server starts with no arguments. Only
//! the listen port is also read from the environment (`PORT`).

use crate::scrapers::InsertMode;
use crate::scrapers::nyt::DEFAULT_SOURCE_URL;
use clap::Parser;
use std::path::PathBuf;
use url::Url;

/// Command-line arguments for the news scraper server.
///
/// # Examples
///
/// ```sh
/// # Defaults: port 3000, ./data/news_scraper, ./public
/// news_scraper
///
/// # Different port and a local copy of the front page
/// PORT=8080 news_scraper --source-url http://localhost:9000/front.html
///
/// # Persist every headline before answering /scrape
/// news_scraper --await-inserts
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Directory of the document store
    #[arg(short, long, default_value = "data/news_scraper")]
    pub database: PathBuf,

    /// Directory of static assets served at `/`
    #[arg(long, default_value = "public")]
    pub public_dir: PathBuf,

    /// Page whose headlines are scraped
    #[arg(long, default_value = DEFAULT_SOURCE_URL)]
    pub source_url: Url,

    /// Wait for every article insert before answering `/scrape`
    #[arg(long)]
    pub await_inserts: bool,
}

impl Cli {
    /// How `/scrape` writes its headlines.
    pub fn insert_mode(&self) -> InsertMode {
        if self.await_inserts {
            InsertMode::Awaited
        } else {
            InsertMode::Detached
        }
    }
}
