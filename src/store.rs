//! Embedded document store for articles and notes.
//!
//! Documents are JSON-encoded and kept in two sled trees, `articles` and
//! `notes`, keyed by the raw bytes of their [`ObjectId`]. Because ids sort in
//! allocation order, iterating a tree yields documents in insertion order.
//!
//! The [`Store`] handle is cheap to clone and safe to share between tasks;
//! every clone talks to the same database.

use crate::models::{Article, Headline, Note, ObjectId, PopulatedArticle};
use chrono::Utc;
use serde_json::{Map, Value};
use sled::{Db, Tree};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, instrument};

const ARTICLES_TREE: &str = "articles";
const NOTES_TREE: &str = "notes";

/// Errors surfaced by store operations.
///
/// Each variant carries a stable [`name`](StoreError::name) which, together
/// with its display message, is exposed verbatim to API clients.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Cast to ObjectId failed for value \"{value}\" at path \"_id\" for model \"{model}\"")]
    Cast { model: &'static str, value: String },
    #[error("{0}")]
    Database(#[from] sled::Error),
    #[error("{0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Short error kind reported alongside the message.
    pub fn name(&self) -> &'static str {
        match self {
            StoreError::Cast { .. } => "CastError",
            StoreError::Database(_) => "DatabaseError",
            StoreError::Serialization(_) => "SerializationError",
        }
    }
}

/// Parse a request-supplied identifier for `model`.
pub fn cast_id(model: &'static str, value: &str) -> Result<ObjectId, StoreError> {
    value.parse().map_err(|_| StoreError::Cast {
        model,
        value: value.to_string(),
    })
}

/// Handle to the article and note collections.
#[derive(Clone, Debug)]
pub struct Store {
    db: Db,
    articles: Tree,
    notes: Tree,
}

impl Store {
    /// Open (or create) the database at `path`.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path.as_ref())?;
        let store = Self::from_db(db)?;
        info!(
            articles = store.articles.len(),
            notes = store.notes.len(),
            "Opened document store"
        );
        Ok(store)
    }

    /// An in-memory database removed on drop.
    #[cfg(test)]
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, StoreError> {
        let articles = db.open_tree(ARTICLES_TREE)?;
        let notes = db.open_tree(NOTES_TREE)?;
        Ok(Self { db, articles, notes })
    }

    /// Allocate an id. The counter leads the key so ordering never depends on
    /// the wall clock.
    fn next_id(&self) -> Result<ObjectId, StoreError> {
        let counter = self.db.generate_id()?;
        let seconds = u32::try_from(Utc::now().timestamp()).unwrap_or_default();
        Ok(ObjectId::from_parts(seconds, counter))
    }

    /// Persist a scraped headline as a new article.
    #[instrument(level = "debug", skip_all)]
    pub fn insert_article(&self, headline: Headline) -> Result<Article, StoreError> {
        let article = Article {
            id: self.next_id()?,
            title: headline.title,
            link: headline.link,
            note: None,
        };
        self.articles
            .insert(article.id.as_bytes(), serde_json::to_vec(&article)?)?;
        debug!(id = %article.id, "Inserted article");
        Ok(article)
    }

    /// Every article, in insertion order.
    pub fn find_articles(&self) -> Result<Vec<Article>, StoreError> {
        self.articles
            .iter()
            .values()
            .map(|value| -> Result<Article, StoreError> {
                Ok(serde_json::from_slice(&value?)?)
            })
            .collect()
    }

    /// A single article, with its note reference left as an id.
    pub fn find_article(&self, id: ObjectId) -> Result<Option<Article>, StoreError> {
        match self.articles.get(id.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// A single article with its note reference resolved to the full note.
    pub fn find_article_populated(
        &self,
        id: ObjectId,
    ) -> Result<Option<PopulatedArticle>, StoreError> {
        let Some(article) = self.find_article(id)? else {
            return Ok(None);
        };
        let note = match article.note {
            Some(note_id) => Some(self.find_note(note_id)?),
            None => None,
        };
        Ok(Some(PopulatedArticle {
            id: article.id,
            title: article.title,
            link: article.link,
            note,
        }))
    }

    /// Persist a note built from arbitrary fields.
    ///
    /// A caller-supplied `_id` is discarded; the store always assigns identity.
    #[instrument(level = "debug", skip_all)]
    pub fn create_note(&self, mut fields: Map<String, Value>) -> Result<Note, StoreError> {
        fields.remove("_id");
        let note = Note {
            id: self.next_id()?,
            fields,
        };
        self.notes
            .insert(note.id.as_bytes(), serde_json::to_vec(&note)?)?;
        debug!(id = %note.id, "Inserted note");
        Ok(note)
    }

    /// Write `bytes` under `id` in the articles tree as-is.
    #[cfg(test)]
    pub fn insert_raw_article(&self, id: ObjectId, bytes: &[u8]) -> Result<(), StoreError> {
        self.articles.insert(id.as_bytes(), bytes)?;
        Ok(())
    }

    /// Every note, in insertion order.
    #[cfg(test)]
    pub fn find_notes(&self) -> Result<Vec<Note>, StoreError> {
        self.notes
            .iter()
            .values()
            .map(|value| -> Result<Note, StoreError> { Ok(serde_json::from_slice(&value?)?) })
            .collect()
    }

    pub fn find_note(&self, id: ObjectId) -> Result<Option<Note>, StoreError> {
        match self.notes.get(id.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Point an article at `note`, replacing any previous reference.
    ///
    /// Returns the updated article, or `None` if no article has that id.
    /// The note's existence is not checked.
    #[instrument(level = "debug", skip_all, fields(%id, %note))]
    pub fn set_article_note(
        &self,
        id: ObjectId,
        note: ObjectId,
    ) -> Result<Option<Article>, StoreError> {
        loop {
            let Some(current) = self.articles.get(id.as_bytes())? else {
                return Ok(None);
            };
            let mut article: Article = serde_json::from_slice(&current)?;
            article.note = Some(note);
            let updated = serde_json::to_vec(&article)?;

            match self
                .articles
                .compare_and_swap(id.as_bytes(), Some(current), Some(updated))?
            {
                Ok(()) => return Ok(Some(article)),
                Err(_) => debug!("Article changed concurrently; retrying update"),
            }
        }
    }
}
