use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Local, NaiveDate, Utc};
use notify_debouncer_mini::{new_debouncer, notify::RecursiveMode, DebounceEventResult};
use rusqlite::Connection;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::data;
use crate::db;
use crate::dates;
use crate::html;
use crate::types::Initiative;

/// Application state shared across requests
pub struct AppState {
    pub db: Mutex<Connection>,
    pub import_dir: PathBuf,
}

/// Error surface of the JSON API. Unparseable date *text* is never an error
/// anywhere in the app; these cover unknown ids, malformed requests and
/// storage failures only.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(e) => {
                error!(error = %e, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

/// Start the web server with import-directory watching
pub async fn serve(port: u16, db_path: PathBuf, import_dir: PathBuf) -> anyhow::Result<()> {
    let conn = db::init_db(&db_path)?;

    // Pick up any exports already waiting in the import directory
    let stats = data::process_all_imports(&conn, &import_dir)?;
    info!(
        total = db::count_initiatives(&conn)?,
        imported = stats.inserted,
        "Directory loaded"
    );

    let state = Arc::new(AppState {
        db: Mutex::new(conn),
        import_dir: import_dir.clone(),
    });

    start_import_watcher(state.clone())?;

    let app = build_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    println!("\nServer running at http://{}", addr);
    println!("Watching {}/ for new exports...", import_dir.display());
    println!("Press Ctrl+C to stop\n");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application router. Split from `serve` so handler tests can
/// drive it without binding a socket.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/iniziative", get(list_handler).post(create_handler))
        .route(
            "/api/iniziative/{id}",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
        .route("/api/giorno/{date}", get(day_handler))
        .route("/api/refresh", get(refresh_handler))
        .with_state(state)
}

/// Start watching the import directory for new export drops
fn start_import_watcher(state: Arc<AppState>) -> anyhow::Result<()> {
    let import_dir = state.import_dir.clone();

    if !import_dir.exists() {
        std::fs::create_dir_all(&import_dir)?;
        info!(dir = %import_dir.display(), "Created import directory");
    }

    let (tx, mut rx) = tokio::sync::mpsc::channel(10);

    // The watcher backend is blocking, so it lives on its own thread
    let watch_dir = import_dir.clone();
    std::thread::spawn(move || {
        let tx_clone = tx.clone();
        let mut debouncer = new_debouncer(
            Duration::from_secs(2),
            move |result: DebounceEventResult| {
                if let Ok(events) = result {
                    let has_import = events.iter().any(|e| data::is_import_file(&e.path));
                    if has_import {
                        let _ = tx_clone.blocking_send(());
                    }
                }
            },
        )
        .expect("Failed to create debouncer");

        debouncer
            .watcher()
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .expect("Failed to watch import directory");

        // Keep the watcher alive
        loop {
            std::thread::sleep(Duration::from_secs(60));
        }
    });

    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            info!("Detected changes in import directory");
            let conn = state.db.lock().await;
            match data::process_all_imports(&conn, &state.import_dir) {
                Ok(stats) if stats.inserted > 0 => {
                    info!(inserted = stats.inserted, "Imported new initiatives");
                }
                Ok(_) => {
                    info!("No new initiatives found");
                }
                Err(e) => {
                    warn!(error = %e, "Import failed");
                }
            }
        }
    });

    Ok(())
}

#[derive(Debug, Deserialize)]
struct IndexParams {
    giorno: Option<String>,
}

/// Serve the calendar view. With no (or an unreadable) `giorno` parameter
/// the default day is chosen from the initiative dates themselves.
async fn index_handler(
    Query(params): Query<IndexParams>,
    State(state): State<Arc<AppState>>,
) -> Result<Html<String>, ApiError> {
    let conn = state.db.lock().await;
    let all = db::list_initiatives(&conn)?;
    drop(conn);

    let now = Utc::now();
    let listed: Vec<Initiative> = all.into_iter().filter(|i| !i.is_expired(now)).collect();

    let requested = params
        .giorno
        .as_deref()
        .and_then(|text| NaiveDate::parse_from_str(text, "%Y-%m-%d").ok());

    let today = Local::now().date_naive();
    let selected = match requested {
        Some(day) => Some(day),
        None => dates::pick_default_day(&listed, today, None),
    };

    let matched = match selected {
        Some(day) => dates::filter_by_day(&listed, day),
        None => Vec::new(),
    };

    Ok(Html(
        html::render_page(selected, &matched, listed.len()).into_string(),
    ))
}

/// Return every record, including expired ones (this is the management
/// surface, not the public directory)
async fn list_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Initiative>>, ApiError> {
    let conn = state.db.lock().await;
    let all = db::list_initiatives(&conn)?;
    Ok(Json(all))
}

async fn get_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<Initiative>, ApiError> {
    let conn = state.db.lock().await;
    let initiative = db::get_initiative(&conn, &id)?.ok_or(ApiError::NotFound)?;
    Ok(Json(initiative))
}

#[derive(Debug, Deserialize)]
struct NewInitiative {
    title: String,
    #[serde(default)]
    organization: String,
    #[serde(default)]
    location: String,
    #[serde(rename = "type", default)]
    category: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    end_date: Option<String>,
}

async fn create_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewInitiative>,
) -> Result<(StatusCode, Json<Initiative>), ApiError> {
    if body.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }

    let initiative = Initiative::new(
        body.title,
        body.organization,
        body.location,
        body.category,
        body.description,
        body.date,
        body.end_date,
    );

    let conn = state.db.lock().await;
    db::insert_initiative(&conn, &initiative)?;

    Ok((StatusCode::CREATED, Json(initiative)))
}

#[derive(Debug, Deserialize)]
struct UpdateBody {
    title: Option<String>,
    organization: Option<String>,
    location: Option<String>,
    #[serde(rename = "type")]
    category: Option<String>,
    description: Option<String>,
    date: Option<String>,
    end_date: Option<String>,
}

async fn update_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
    Json(body): Json<UpdateBody>,
) -> Result<Json<Initiative>, ApiError> {
    let updates = db::InitiativeUpdate {
        title: body.title,
        organization: body.organization,
        location: body.location,
        category: body.category,
        description: body.description,
        date: body.date,
        end_date: body.end_date,
    };

    let conn = state.db.lock().await;
    if !db::update_initiative(&conn, &id, &updates)? {
        return Err(ApiError::NotFound);
    }

    let initiative = db::get_initiative(&conn, &id)?.ok_or(ApiError::NotFound)?;
    Ok(Json(initiative))
}

async fn delete_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Result<StatusCode, ApiError> {
    let conn = state.db.lock().await;
    if !db::delete_initiative(&conn, &id)? {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Return the initiatives active on a calendar day
async fn day_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(date): AxumPath<String>,
) -> Result<Json<Vec<Initiative>>, ApiError> {
    let day = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("invalid date: {}", date)))?;

    let conn = state.db.lock().await;
    let all = db::list_initiatives(&conn)?;
    drop(conn);

    let now = Utc::now();
    let listed: Vec<Initiative> = all.into_iter().filter(|i| !i.is_expired(now)).collect();
    let matched: Vec<Initiative> = dates::filter_by_day(&listed, day)
        .into_iter()
        .cloned()
        .collect();

    Ok(Json(matched))
}

/// Re-scan the import directory (manual trigger)
async fn refresh_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<data::ImportStats>, ApiError> {
    info!("Manual refresh triggered");
    let conn = state.db.lock().await;
    let stats = data::process_all_imports(&conn, &state.import_dir)?;
    Ok(Json(stats))
}
