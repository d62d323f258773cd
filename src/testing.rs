//! Shared helpers for tests that need live HTTP servers.

use crate::api::{AppState, router};
use crate::scrapers::InsertMode;
use crate::store::Store;
use axum::Router;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tracing_subscriber::fmt::MakeWriter;
use url::Url;

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_router(router: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    Url::parse(&format!("http://{addr}/")).unwrap()
}

/// Stand-in news site answering `GET /` with `status` and `html`.
pub async fn serve_markup(status: StatusCode, html: &'static str) -> Url {
    let site = Router::new().route("/", get(move || async move { (status, Html(html)) }));
    spawn_router(site).await
}

/// Running application wired to `source`, a fresh temporary store, and
/// `public_dir` for static assets.
pub struct TestApp {
    pub base: Url,
    pub store: Store,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn(source: Url, mode: InsertMode, public_dir: &Path) -> Self {
        let store = Store::temporary().unwrap();
        let client = reqwest::Client::new();
        let state = AppState {
            store: store.clone(),
            client: client.clone(),
            source_url: source,
            insert_mode: mode,
        };
        let base = spawn_router(router(state, public_dir)).await;
        Self {
            base,
            store,
            client,
        }
    }

    pub fn url(&self, path: &str) -> Url {
        self.base.join(path).unwrap()
    }
}

/// In-memory sink for formatted log output.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
