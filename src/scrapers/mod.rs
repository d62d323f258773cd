//! Front page scraping and persistence of the extracted headlines.
//!
//! A scrape is a single pass:
//!
//! 1. **Fetching**: one GET of the configured source URL ([`nyt::fetch_markup`])
//! 2. **Extraction**: every `article h2` becomes a [`Headline`] ([`nyt::extract_headlines`])
//! 3. **Persistence**: each headline is inserted into the article store
//!
//! # Insert Modes
//!
//! | Mode | Behavior |
//! |------|----------|
//! | [`InsertMode::Detached`] | One blocking task per headline; the caller does not wait. Unordered, uncapped. |
//! | [`InsertMode::Awaited`] | Headlines are inserted one by one, in document order, before returning. |
//!
//! Inserts are blocking sled writes and always run on the blocking pool. In
//! both modes a failed insert is logged and otherwise ignored; it never fails
//! the scrape.

pub mod nyt;

use crate::models::Headline;
use crate::store::Store;
use crate::utils::truncate_for_log;
use reqwest::Client;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};
use url::Url;

pub use nyt::FetchError;

/// How scraped headlines are written to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertMode {
    /// Fire-and-forget inserts; the scrape returns as soon as they are spawned.
    #[default]
    Detached,
    /// Sequential inserts completed before the scrape returns.
    Awaited,
}

/// Outcome of a successful fetch-and-extract pass.
#[derive(Debug)]
pub struct ScrapeRun {
    /// Number of headlines extracted, i.e. insert attempts issued.
    pub matched: usize,
    /// Detached insert tasks. Always empty for [`InsertMode::Awaited`].
    /// Dropping the handles leaves the tasks running.
    pub pending: Vec<JoinHandle<()>>,
}

/// Fetch `url`, extract its headlines and insert one article per headline.
///
/// Fails only when the page cannot be fetched, in which case nothing is
/// inserted.
#[instrument(level = "info", skip_all, fields(%url, ?mode))]
pub async fn scrape_front_page(
    client: &Client,
    url: &Url,
    store: &Store,
    mode: InsertMode,
) -> Result<ScrapeRun, FetchError> {
    let html = nyt::fetch_markup(client, url).await?;
    let headlines = nyt::extract_headlines(&html);
    let matched = headlines.len();
    info!(matched, "Issuing article inserts");

    let pending = match mode {
        InsertMode::Detached => headlines
            .into_iter()
            .map(|headline| {
                let store = store.clone();
                tokio::task::spawn_blocking(move || persist(&store, headline))
            })
            .collect(),
        InsertMode::Awaited => {
            let store = store.clone();
            let inserts = tokio::task::spawn_blocking(move || {
                for headline in headlines {
                    persist(&store, headline);
                }
            });
            if let Err(e) = inserts.await {
                error!(error = %e, "Article insert task failed");
            }
            Vec::new()
        }
    };

    Ok(ScrapeRun { matched, pending })
}

fn persist(store: &Store, headline: Headline) {
    match store.insert_article(headline) {
        Ok(article) => info!(
            id = %article.id,
            title = %truncate_for_log(&article.title, 80),
            link = %article.link,
            "Created article"
        ),
        Err(e) => error!(error = %e, kind = e.name(), "Failed to create article"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::serve_markup;
    use axum::http::StatusCode;

    const ONE_HEADLINE: &str = r#"<article><h2><a href="/x">Title X</a></h2></article>"#;

    const THREE_HEADLINES: &str = r#"
        <article><h2><a href="/a">A</a></h2></article>
        <article><h2><a href="/b">B</a></h2></article>
        <article><h2>No anchor</h2></article>
    "#;

    #[tokio::test]
    async fn test_detached_scrape_issues_one_insert_per_headline() {
        let url = serve_markup(StatusCode::OK, THREE_HEADLINES).await;
        let store = Store::temporary().unwrap();

        let run = scrape_front_page(&Client::new(), &url, &store, InsertMode::Detached)
            .await
            .unwrap();
        assert_eq!(run.matched, 3);
        assert_eq!(run.pending.len(), 3);
        for handle in run.pending {
            handle.await.unwrap();
        }

        let mut pairs: Vec<(String, String)> = store
            .find_articles()
            .unwrap()
            .into_iter()
            .map(|a| (a.title, a.link))
            .collect();
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("".to_string(), "".to_string()),
                ("A".to_string(), "/a".to_string()),
                ("B".to_string(), "/b".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_awaited_scrape_inserts_in_document_order() {
        let url = serve_markup(StatusCode::OK, THREE_HEADLINES).await;
        let store = Store::temporary().unwrap();

        let run = scrape_front_page(&Client::new(), &url, &store, InsertMode::Awaited)
            .await
            .unwrap();
        assert_eq!(run.matched, 3);
        assert!(run.pending.is_empty());

        let titles: Vec<String> = store
            .find_articles()
            .unwrap()
            .into_iter()
            .map(|a| a.title)
            .collect();
        assert_eq!(titles, ["A", "B", ""]);
    }

    #[tokio::test]
    async fn test_scraping_twice_duplicates_articles() {
        let url = serve_markup(StatusCode::OK, ONE_HEADLINE).await;
        let store = Store::temporary().unwrap();
        let client = Client::new();

        for _ in 0..2 {
            scrape_front_page(&client, &url, &store, InsertMode::Awaited)
                .await
                .unwrap();
        }

        let articles = store.find_articles().unwrap();
        assert_eq!(articles.len(), 2);
        for article in articles {
            assert_eq!(article.title, "Title X");
            assert_eq!(article.link, "/x");
            assert_eq!(article.note, None);
        }
    }

    #[tokio::test]
    async fn test_empty_page_scrapes_nothing() {
        let url = serve_markup(StatusCode::OK, "<html><body></body></html>").await;
        let store = Store::temporary().unwrap();

        let run = scrape_front_page(&Client::new(), &url, &store, InsertMode::Detached)
            .await
            .unwrap();
        assert_eq!(run.matched, 0);
        assert!(run.pending.is_empty());
        assert!(store.find_articles().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_error_status_inserts_nothing() {
        let url = serve_markup(StatusCode::SERVICE_UNAVAILABLE, ONE_HEADLINE).await;
        let store = Store::temporary().unwrap();

        let err = scrape_front_page(&Client::new(), &url, &store, InsertMode::Awaited)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("503"));
        assert!(store.find_articles().unwrap().is_empty());
    }
}
