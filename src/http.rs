use std::path::{Path, PathBuf};

use anyhow::Context;
use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};
use uuid::Uuid;

use crate::id::JobId;
use crate::import::{ImportEngine, Progress, Upload};
use crate::pieces::Piece;

const UPLOAD_LIMIT: usize = 512 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub engine: ImportEngine,
    /// Where uploads are spooled while their job runs.
    pub upload_dir: PathBuf,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/import", post(import))
        .route("/import-progress", post(import_progress))
        .route("/import-cancel", post(import_cancel))
        .route("/pieces", get(list_pieces))
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT))
        .with_state(state)
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub status: String,
    pub job_id: Option<JobId>,
}

impl ImportResponse {
    fn status(status: &str) -> Json<Self> {
        Json(Self {
            status: status.to_string(),
            job_id: None,
        })
    }
}

#[skip_serializing_none]
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub status: Option<&'static str>,
    pub job: Option<Progress>,
    pub not_found: Option<bool>,
    pub failed: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct JobRequest {
    #[serde(alias = "_id")]
    pub id: String,
}

async fn import(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Json<ImportResponse> {
    let Ok(mut multipart) = multipart else {
        return ImportResponse::status("required");
    };

    let upload = match spool_upload(&state.upload_dir, &mut multipart).await {
        Ok(Some(upload)) => upload,
        Ok(None) => return ImportResponse::status("required"),
        Err(e) => {
            error!("failed to receive upload: {:#}", e);
            return ImportResponse::status("error");
        }
    };

    let path = upload.path.clone();
    match state.engine.submit(upload).await {
        Ok(handle) => Json(ImportResponse {
            status: "ok".to_string(),
            job_id: Some(handle.id),
        }),
        Err(e) => {
            error!("failed to create import job: {}", e);
            let _ = tokio::fs::remove_file(&path).await;
            ImportResponse::status("error")
        }
    }
}

/// Writes the `file` part of the form to a fresh file under `dir`.
async fn spool_upload(dir: &Path, multipart: &mut Multipart) -> anyhow::Result<Option<Upload>> {
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let path = dir.join(Uuid::new_v4().simple().to_string());
        let mut file = tokio::fs::File::create(&path)
            .await
            .with_context(|| format!("creating {:?}", path))?;
        while let Some(chunk) = field.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        debug!(file = %file_name, "upload received");

        return Ok(Some(Upload {
            file_name,
            path,
            remove_when_done: true,
        }));
    }
    Ok(None)
}

async fn import_progress(
    State(state): State<AppState>,
    Json(request): Json<JobRequest>,
) -> Json<ProgressResponse> {
    let not_found = || {
        Json(ProgressResponse {
            not_found: Some(true),
            ..Default::default()
        })
    };

    let Ok(id) = request.id.parse::<JobId>() else {
        return not_found();
    };

    match state.engine.progress(&id).await {
        Ok(Some(progress)) => Json(ProgressResponse {
            status: Some("ok"),
            job: Some(progress),
            ..Default::default()
        }),
        Ok(None) => not_found(),
        Err(e) => {
            error!(job = %id, "failed to load import progress: {}", e);
            Json(ProgressResponse {
                failed: Some(true),
                ..Default::default()
            })
        }
    }
}

/// Answers ok whether or not the job exists or is still running.
async fn import_cancel(
    State(state): State<AppState>,
    Json(request): Json<JobRequest>,
) -> Json<StatusResponse> {
    if let Ok(id) = request.id.parse::<JobId>() {
        if let Err(e) = state.engine.cancel(&id).await {
            error!(job = %id, "failed to request cancel: {}", e);
        }
    }
    Json(StatusResponse { status: "ok" })
}

async fn list_pieces(State(state): State<AppState>) -> Result<Json<Vec<Piece>>, StatusCode> {
    state.engine.pieces().find_published().await.map(Json).map_err(|e| {
        error!("failed to list pieces: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
