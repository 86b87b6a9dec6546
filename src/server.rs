// src/server.rs

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{convert::Infallible, sync::Arc};
use tracing::{error, info, warn};
use warp::{
    http::StatusCode,
    path::Tail,
    reply::Response,
    Filter, Rejection, Reply,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::{self, DatasetProvider};
use crate::registry::{self, Registry};
use crate::table::{self, Preview};

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub provider: Arc<dyn DatasetProvider>,
}

impl AppState {
    pub fn new(config: Config, provider: Arc<dyn DatasetProvider>) -> Self {
        Self {
            config: Arc::new(config),
            provider,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PreviewQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct DownloadResponse {
    message: String,
    dataset_id: String,
    files: Vec<String>,
}

#[derive(Serialize)]
struct CleanResponse {
    #[serde(flatten)]
    preview: Preview,
    dropped_rows: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

/// Every route, with rejections turned into JSON error bodies.
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(health_check);

    let datasets = warp::path("datasets")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(list_datasets);

    let download = warp::path!("download-dataset" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(download_dataset);

    let files = warp::path("files")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(list_data_files);

    let read = warp::path("read")
        .and(warp::path::tail())
        .and(warp::get())
        .and(warp::query::<PreviewQuery>())
        .and(with_state(state.clone()))
        .and_then(read_file);

    let clean = warp::path("clean")
        .and(warp::path::tail())
        .and(warp::get())
        .and(warp::query::<PreviewQuery>())
        .and(with_state(state))
        .and_then(clean_file);

    health
        .or(datasets)
        .or(download)
        .or(files)
        .or(read)
        .or(clean)
        .recover(handle_rejection)
        .with(warp::trace::request())
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn decode(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

async fn health_check() -> std::result::Result<impl Reply, Infallible> {
    Ok(warp::reply::json(&json!({
        "status": "healthy",
        "service": "datashelf"
    })))
}

async fn list_datasets(state: AppState) -> std::result::Result<Response, Infallible> {
    let result = Registry::load(&state.config.registry).map(|r| json!({ "datasets": r.datasets() }));
    Ok(respond(result))
}

async fn download_dataset(name: String, state: AppState) -> std::result::Result<Response, Infallible> {
    let name = decode(&name);
    Ok(respond(download(&state, &name).await))
}

async fn download(state: &AppState, name: &str) -> Result<DownloadResponse> {
    let descriptor = registry::lookup(&state.config.registry, name)?;
    let report =
        fetch::fetch_dataset(state.provider.as_ref(), &descriptor, &state.config.data_dir).await?;
    info!(dataset = %name, files = report.files.len(), "dataset downloaded");

    Ok(DownloadResponse {
        message: format!("Dataset '{name}' downloaded successfully!"),
        dataset_id: report.dataset_id,
        files: report.files,
    })
}

async fn list_data_files(state: AppState) -> std::result::Result<Response, Infallible> {
    let dir = state.config.data_dir.clone();
    let result = tokio::task::spawn_blocking(move || table::list_files(&dir))
        .await
        .map_err(Error::from)
        .and_then(|r| r)
        .map(|files| json!({ "files": files }));
    Ok(respond(result))
}

async fn read_file(
    tail: Tail,
    query: PreviewQuery,
    state: AppState,
) -> std::result::Result<Response, Infallible> {
    let filename = decode(tail.as_str());
    let limit = state.config.preview_limit(query.limit);
    let dir = state.config.data_dir.clone();

    let result = tokio::task::spawn_blocking(move || table::read_table(&dir, &filename)?.preview(limit))
        .await
        .map_err(Error::from)
        .and_then(|r| r);
    Ok(respond(result))
}

async fn clean_file(
    tail: Tail,
    query: PreviewQuery,
    state: AppState,
) -> std::result::Result<Response, Infallible> {
    let filename = decode(tail.as_str());
    let limit = state.config.preview_limit(query.limit);
    let dir = state.config.data_dir.clone();

    let result = tokio::task::spawn_blocking(move || -> Result<CleanResponse> {
        let original = table::read_table(&dir, &filename)?;
        let cleaned = table::drop_null_rows(&original)?;
        Ok(CleanResponse {
            dropped_rows: original.num_rows() - cleaned.num_rows(),
            preview: cleaned.preview(limit)?,
        })
    })
    .await
    .map_err(Error::from)
    .and_then(|r| r);
    Ok(respond(result))
}

fn respond<T: Serialize>(result: Result<T>) -> Response {
    match result {
        Ok(body) => warp::reply::json(&body).into_response(),
        Err(err) => error_response(&err),
    }
}

fn error_response(err: &Error) -> Response {
    let status = err.status_code();
    if status.is_server_error() {
        error!(status = status.as_u16(), error = %err, "request failed");
    } else {
        warn!(status = status.as_u16(), error = %err, "request rejected");
    }
    json_error(status, err.to_string())
}

fn json_error(status: StatusCode, detail: String) -> Response {
    warp::reply::with_status(warp::reply::json(&ErrorResponse { detail }), status).into_response()
}

async fn handle_rejection(err: Rejection) -> std::result::Result<Response, Infallible> {
    let (status, detail) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found".to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed".to_string())
    } else {
        error!(rejection = ?err, "unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
    };
    Ok(json_error(status, detail))
}
