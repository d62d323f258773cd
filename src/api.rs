//! HTTP API for scraping and browsing articles.
//!
//! # Routes
//!
//! | Method | Path | Response |
//! |--------|------|----------|
//! | `GET` | `/scrape` | `"Scrape Complete"` once the inserts are issued |
//! | `GET` | `/api/articles` | every article, in insertion order |
//! | `GET` | `/api/articles/:id` | one article with its note resolved, or `null` |
//! | `POST` | `/api/articles/:id` | create a note from the body and attach it; the updated article or `null` |
//!
//! Any other path is served from the static asset directory.
//!
//! # Errors
//!
//! Store failures are answered with `500` and `{"error": {"name", "message"}}`,
//! the message passed through verbatim. A failed upstream fetch during
//! `/scrape` is a `502` in the same shape. An unknown id is not an error: the
//! response is `200` with a `null` body.
//!
//! Store calls are blocking sled I/O and run on the blocking thread pool.

use crate::models::{Article, PopulatedArticle};
use crate::scrapers::{self, FetchError, InsertMode};
use crate::store::{Store, StoreError, cast_id};
use axum::body::Bytes;
use axum::extract::{FromRequest, Path, Request, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Json, Router, async_trait};
use reqwest::Client;
use serde_json::{Map, Value, json};
use std::path::Path as FsPath;
use thiserror::Error;
use tokio::task::JoinError;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info, instrument, warn};
use url::Url;

/// State shared by every handler.
///
/// The store is opened once at startup; all fields are cheap clones of
/// shared handles.
#[derive(Clone, Debug)]
pub struct AppState {
    pub store: Store,
    pub client: Client,
    pub source_url: Url,
    pub insert_mode: InsertMode,
}

/// Build the application router, serving static assets from `public_dir`.
pub fn router(state: AppState, public_dir: &FsPath) -> Router {
    Router::new()
        .route("/scrape", get(scrape))
        .route("/api/articles", get(list_articles))
        .route("/api/articles/:id", get(get_article).post(attach_note))
        .fallback_service(ServeDir::new(public_dir))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// Errors a handler can answer with.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Task(#[from] JoinError),
    #[error("{message}")]
    Body { name: &'static str, message: String },
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Fetch(_) => StatusCode::BAD_GATEWAY,
            ApiError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Body { .. } => StatusCode::BAD_REQUEST,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ApiError::Store(e) => e.name(),
            ApiError::Fetch(_) => "FetchError",
            ApiError::Task(_) => "TaskError",
            ApiError::Body { name, .. } => *name,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, name = self.name(), error = %self, "Request failed");
        } else {
            warn!(%status, name = self.name(), error = %self, "Request rejected");
        }
        let body = json!({
            "error": {
                "name": self.name(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

/// Request body turned into note fields.
///
/// JSON objects are taken as-is. Urlencoded forms are expanded by
/// [`form_fields`]. Any other content type, or an empty body, gives an empty
/// note.
#[derive(Debug)]
pub struct NoteBody(pub Map<String, Value>);

#[async_trait]
impl<S> FromRequest<S> for NoteBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map_err(|rejection| ApiError::Body {
                    name: "BadRequestError",
                    message: rejection.body_text(),
                })?;
            return Ok(NoteBody(form_fields(pairs)));
        }

        if !content_type.starts_with("application/json") {
            return Ok(NoteBody(Map::new()));
        }

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::Body {
                name: "BadRequestError",
                message: rejection.body_text(),
            })?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(NoteBody(Map::new()));
        }
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(fields)) => Ok(NoteBody(fields)),
            Ok(_) => Err(ApiError::Body {
                name: "SyntaxError",
                message: "note body must be a JSON object".to_string(),
            }),
            Err(e) => Err(ApiError::Body {
                name: "SyntaxError",
                message: e.to_string(),
            }),
        }
    }
}

/// Deepest bracket nesting expanded from a form key. Anything past it stays
/// one literal key segment.
const MAX_FORM_DEPTH: usize = 5;

/// Largest bracket index treated as an array position rather than a key.
const MAX_FORM_INDEX: usize = 20;

/// Expand urlencoded pairs into nested note fields.
///
/// `tags=a&tags=b` gives `{"tags": ["a", "b"]}`, `tags[]=a` appends to an
/// array, `note[title]=x` gives `{"note": {"title": "x"}}` and `list[0]=x`
/// addresses an array slot. Every value ends up somewhere; a key that clashes
/// with an earlier shape turns the slot into an array holding both.
pub fn form_fields(pairs: Vec<(String, String)>) -> Map<String, Value> {
    let mut fields = Map::new();
    for (key, value) in pairs {
        let (root, path) = form_key_path(&key);
        let slot = fields.remove(&root);
        fields.insert(root, place_form_value(slot, &path, value));
    }
    fields
}

fn form_key_path(key: &str) -> (String, Vec<String>) {
    let open = match key.find('[') {
        Some(open) if open > 0 => open,
        _ => return (key.to_string(), Vec::new()),
    };

    let mut path = Vec::new();
    let mut rest = &key[open..];
    while path.len() < MAX_FORM_DEPTH {
        let Some(inner) = rest.strip_prefix('[') else {
            break;
        };
        let Some(close) = inner.find(']') else {
            break;
        };
        path.push(inner[..close].to_string());
        rest = &inner[close + 1..];
    }
    if !rest.is_empty() {
        path.push(rest.to_string());
    }
    (key[..open].to_string(), path)
}

fn form_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok().filter(|index| *index <= MAX_FORM_INDEX)
}

fn place_form_value(slot: Option<Value>, path: &[String], value: String) -> Value {
    let Some((segment, rest)) = path.split_first() else {
        return match slot {
            None => Value::String(value),
            Some(Value::Array(mut items)) => {
                items.push(Value::String(value));
                Value::Array(items)
            }
            Some(existing) => Value::Array(vec![existing, Value::String(value)]),
        };
    };

    match slot {
        Some(Value::Object(mut object)) => {
            let key = if segment.is_empty() {
                object.len().to_string()
            } else {
                segment.clone()
            };
            let child = object.remove(&key);
            object.insert(key, place_form_value(child, rest, value));
            Value::Object(object)
        }
        Some(Value::Array(mut items)) if segment.is_empty() || form_index(segment).is_some() => {
            match form_index(segment) {
                Some(index) if index < items.len() => {
                    let child = std::mem::take(&mut items[index]);
                    items[index] = place_form_value(Some(child), rest, value);
                }
                _ => items.push(place_form_value(None, rest, value)),
            }
            Value::Array(items)
        }
        Some(Value::Array(items)) => {
            let mut object: Map<String, Value> = items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (i.to_string(), item))
                .collect();
            let child = object.remove(segment);
            object.insert(segment.clone(), place_form_value(child, rest, value));
            Value::Object(object)
        }
        Some(scalar) => Value::Array(vec![scalar, place_form_value(None, path, value)]),
        None if segment.is_empty() || form_index(segment).is_some() => {
            Value::Array(vec![place_form_value(None, rest, value)])
        }
        None => {
            let mut object = Map::new();
            object.insert(segment.clone(), place_form_value(None, rest, value));
            Value::Object(object)
        }
    }
}

/// Run a store operation on the blocking pool.
async fn with_store<T, F>(store: &Store, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&Store) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    Ok(tokio::task::spawn_blocking(move || op(&store)).await??)
}

#[instrument(level = "info", skip_all)]
async fn scrape(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    let run = scrapers::scrape_front_page(
        &state.client,
        &state.source_url,
        &state.store,
        state.insert_mode,
    )
    .await?;
    info!(
        matched = run.matched,
        detached = run.pending.len(),
        "Scrape issued"
    );
    Ok("Scrape Complete")
}

async fn list_articles(State(state): State<AppState>) -> Result<Json<Vec<Article>>, ApiError> {
    Ok(Json(with_store(&state.store, |store| store.find_articles()).await?))
}

async fn get_article(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Option<PopulatedArticle>>, ApiError> {
    let id = cast_id("Article", &id)?;
    Ok(Json(
        with_store(&state.store, move |store| store.find_article_populated(id)).await?,
    ))
}

/// Create a note from the body, then point the article at it.
///
/// The note is created before the id is parsed or looked up. A malformed id
/// or an id with no article leaves it in the store, unattached.
#[instrument(level = "info", skip_all, fields(%id))]
async fn attach_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
    NoteBody(fields): NoteBody,
) -> Result<Json<Option<Article>>, ApiError> {
    let note = with_store(&state.store, move |store| store.create_note(fields)).await?;
    let article_id = cast_id("Article", &id)
        .inspect_err(|_| warn!(note = %note.id, "Malformed article id; note left unattached"))?;
    let note_id = note.id;
    let article = with_store(&state.store, move |store| {
        store.set_article_note(article_id, note_id)
    })
    .await?;
    match &article {
        Some(_) => info!(note = %note.id, "Attached note to article"),
        None => warn!(note = %note.id, "No article matched; note left unattached"),
    }
    Ok(Json(article))
}
