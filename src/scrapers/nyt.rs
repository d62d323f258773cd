//! New York Times front page scraper.
//!
//! Fetches the front page once and pulls every headline that sits in an
//! `<article>` element. Each `h2` inside an article becomes one [`Headline`]
//! built from the heading's direct `<a>` children:
//!
//! ```html
//! <article><h2><a href="/x">Title X</a></h2></article>
//! ```
//!
//! yields `Headline { title: "Title X", link: "/x" }`. Links are kept exactly
//! as written in the markup, relative or not.

use crate::models::Headline;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::{debug, info, instrument};
use url::Url;

/// Default page scraped when no source URL is configured.
pub const DEFAULT_SOURCE_URL: &str = "http://www.nytimes.com";

static HEADLINE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("article h2").unwrap());

/// The front page could not be retrieved.
///
/// Covers transport failures and non-2xx responses alike.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct FetchError(#[from] reqwest::Error);

/// Download the raw markup of `url` with a single GET.
#[instrument(level = "info", skip_all, fields(%url))]
pub async fn fetch_markup(client: &Client, url: &Url) -> Result<String, FetchError> {
    let response = client.get(url.clone()).send().await?.error_for_status()?;
    let body = response.text().await?;
    info!(bytes = body.len(), "Fetched front page");
    Ok(body)
}

/// Extract every `article h2` headline from `html`, in document order.
pub fn extract_headlines(html: &str) -> Vec<Headline> {
    let document = Html::parse_document(html);
    let headlines: Vec<Headline> = document
        .select(&HEADLINE_SELECTOR)
        .map(headline_from)
        .collect();
    debug!(count = headlines.len(), "Extracted headlines");
    headlines
}

/// Title is the text of all direct anchor children, link the first anchor's
/// `href`. Either is empty when missing.
fn headline_from(heading: ElementRef<'_>) -> Headline {
    let anchors: Vec<ElementRef<'_>> = heading
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|child| child.value().name() == "a")
        .collect();

    let title = anchors.iter().flat_map(|a| a.text()).collect::<String>();
    let link = anchors
        .first()
        .and_then(|a| a.value().attr("href"))
        .unwrap_or_default()
        .to_string();

    Headline { title, link }
}
