//! Review server: a one-shot web UI for pruning the mirrored session.
//!
//! `GET /` renders every file currently in the target directories as a media
//! preview with a pre-checked checkbox, grouped under a heading per source
//! directory and annotated with the matching record's title where one
//! exists. The semantics are inverted on purpose: a checked
//! box means "delete this file", so the reviewer unchecks what they want to
//! keep and submits. The single `POST /` deletes the checked files, empties
//! the metadata store, and shuts the server down.

use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Router};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::store::{MediaRecord, MetadataStore, StoreError};

/// Errors that can occur running the review server.
#[derive(Debug, Error)]
pub enum ReviewError {
    /// Socket-level error binding or serving.
    #[error("review server I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The metadata store could not be read or updated.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One file on the curation page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewEntry {
    /// Path of the file, as submitted back on deletion and used as the
    /// preview URL.
    pub filepath: String,
    /// Title from the matching metadata record, if any.
    pub title: Option<String>,
}

/// One source directory's worth of files on the curation page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewSection {
    /// Heading shown above the group, the directory's name.
    pub source: String,
    /// Files found in the directory.
    pub entries: Vec<ReviewEntry>,
}

#[derive(Clone)]
struct ReviewState {
    store: Arc<dyn MetadataStore>,
    file_root: PathBuf,
    dirs: Vec<PathBuf>,
    shutdown: Arc<Notify>,
}

/// A bound, ready-to-serve review server.
pub struct ReviewServer {
    listener: TcpListener,
    addr: SocketAddr,
    state: ReviewState,
}

impl ReviewServer {
    /// Binds the server on `127.0.0.1:port` (`port` 0 picks an ephemeral
    /// one). `file_root` is the directory media filepaths are resolved
    /// against, normally the working directory; `dirs` are the target
    /// directories whose files the curation page lists.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError` if the socket cannot be bound.
    pub async fn bind(
        store: Arc<dyn MetadataStore>,
        file_root: impl Into<PathBuf>,
        dirs: Vec<PathBuf>,
        port: u16,
    ) -> Result<Self, ReviewError> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let addr = listener.local_addr()?;
        Ok(Self {
            listener,
            addr,
            state: ReviewState {
                store,
                file_root: file_root.into(),
                dirs,
                shutdown: Arc::new(Notify::new()),
            },
        })
    }

    /// The address the server is listening on.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serves review requests until the reviewer submits the form.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError` if serving fails.
    pub async fn serve(self) -> Result<(), ReviewError> {
        let shutdown = self.state.shutdown.clone();
        let router = Router::new()
            .route("/", get(index).post(submit))
            .fallback(static_file)
            .with_state(self.state);

        info!(addr = %self.addr, "review server listening; open http://{} to review", self.addr);
        axum::serve(self.listener, router)
            .with_graceful_shutdown(async move { shutdown.notified().await })
            .await?;
        info!("review server stopped");
        Ok(())
    }
}

async fn index(State(state): State<ReviewState>) -> Response {
    let records = match state.store.get_all().await {
        Ok(records) => records,
        Err(error) => {
            warn!(%error, "could not load records for review");
            return (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response();
        }
    };
    let sections = collect_sections(&state.dirs, &records).await;
    Html(render_page(&sections)).into_response()
}

/// Lists the files currently present in the target directories, one section
/// per directory with files, annotated with matching record titles. Planned
/// records whose files never arrived simply don't appear. The store's own
/// backing file is skipped.
pub async fn collect_sections(dirs: &[PathBuf], records: &[MediaRecord]) -> Vec<ReviewSection> {
    let mut sections = Vec::new();
    for dir in dirs {
        let mut read_dir = match tokio::fs::read_dir(dir).await {
            Ok(read_dir) => read_dir,
            Err(error) => {
                warn!(dir = %dir.display(), %error, "could not list target directory");
                continue;
            }
        };
        let mut entries = Vec::new();
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with("imagedata.") {
                continue;
            }
            let filepath = path.to_string_lossy().into_owned();
            let title = records
                .iter()
                .find(|r| r.filepath == filepath)
                .map(|r| r.title.clone());
            entries.push(ReviewEntry { filepath, title });
        }
        if entries.is_empty() {
            continue;
        }
        entries.sort_by(|a, b| a.filepath.cmp(&b.filepath));
        let source = dir
            .file_name()
            .map_or_else(|| dir.display().to_string(), |n| n.to_string_lossy().into_owned());
        sections.push(ReviewSection { source, entries });
    }
    sections
}

async fn submit(
    State(state): State<ReviewState>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Response {
    let files: Vec<String> = fields
        .into_iter()
        .filter(|(key, _)| key == "delete")
        .map(|(_, value)| value)
        .collect();

    let result = apply_review(state.store.as_ref(), &files).await;
    state.shutdown.notify_one();

    match result {
        Ok(deleted) => Html(format!(
            "<!doctype html><html><body><p>Deleted {deleted} file(s). \
             The review session is over; you can close this tab.</p></body></html>"
        ))
        .into_response(),
        Err(error) => {
            warn!(%error, "review submission failed");
            (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response()
        }
    }
}

/// Deletes the checked files and empties the store.
///
/// Files already gone are fine; other filesystem refusals are logged and
/// skipped so one stubborn file doesn't abort the whole review.
///
/// # Errors
///
/// Returns `StoreError` if the store cannot be cleared or flushed.
pub async fn apply_review(
    store: &dyn MetadataStore,
    files: &[String],
) -> Result<usize, StoreError> {
    let mut deleted = 0;
    for file in files {
        match tokio::fs::remove_file(file).await {
            Ok(()) => {
                info!(%file, "deleted reviewed file");
                deleted += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(%file, error = %e, "could not delete reviewed file"),
        }
    }

    store.clear().await?;
    store.flush().await?;
    Ok(deleted)
}

/// Renders the review form, one heading per source section. Every entry's
/// checkbox starts checked; unchecking a box keeps its file.
#[must_use]
pub fn render_page(sections: &[ReviewSection]) -> String {
    let mut body = String::from(
        "<!doctype html>\n<html>\n<head><meta charset=\"utf-8\"><title>Review session</title></head>\n<body>\n\
         <h1>Review session</h1>\n\
         <p>Checked files will be <strong>deleted</strong> when you submit. Uncheck what you want to keep.</p>\n\
         <form method=\"post\" action=\"/\">\n",
    );

    for section in sections {
        body.push_str(&format!("<h2>{}</h2>\n", escape_html(&section.source)));
        for entry in &section.entries {
            let label = escape_html(entry.title.as_deref().unwrap_or(&entry.filepath));
            let filepath = escape_html(&entry.filepath);
            let media = if matches!(
                Path::new(&entry.filepath)
                    .extension()
                    .and_then(|e| e.to_str()),
                Some("mp4" | "webm")
            ) {
                format!("<video controls src=\"/{filepath}\"></video>")
            } else {
                format!("<img src=\"/{filepath}\" alt=\"{label}\">")
            };
            body.push_str(&format!(
                "<div>\n<label><input type=\"checkbox\" name=\"delete\" value=\"{filepath}\" checked> {label}</label>\n{media}\n</div>\n",
            ));
        }
    }

    body.push_str(
        "<button type=\"submit\">Delete checked files</button>\n</form>\n</body>\n</html>\n",
    );
    body
}

/// Serves mirrored media files referenced by the review page.
async fn static_file(State(state): State<ReviewState>, uri: Uri) -> Response {
    let decoded = match urlencoding::decode(uri.path()) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => return (StatusCode::BAD_REQUEST, "bad path").into_response(),
    };
    let relative = Path::new(decoded.trim_start_matches('/'));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return (StatusCode::BAD_REQUEST, "bad path").into_response();
    }

    let full = state.file_root.join(relative);
    match tokio::fs::read(&full).await {
        Ok(bytes) => {
            let content_type = content_type_for(&full);
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(_) => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        _ => "application/octet-stream",
    }
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
