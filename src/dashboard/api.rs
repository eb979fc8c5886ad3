use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use jobboard_common::Dashboard;
use jobboard_common::board::project;
use jobboard_common::protocol::{
    AddJobRequest, DeleteTaskRequest, EditJobRequest, ErrorBody, ErrorKind, JobFields,
    MoveTaskRequest, SuccessResponse, TaskEditRequest,
};
use jobboard_common::validate;

use super::auth::{CurrentUser, IdentityProvider, auth_router};
use super::db::DbHandle;
use crate::config::AuthSection;
use crate::errors::SyncError;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub identity: Arc<dyn IdentityProvider>,
    pub auth: AuthSection,
}

pub type SharedState = Arc<AppState>;

// ── Error handling ────────────────────────────────────────────────────

/// Failure at the HTTP boundary. Always rendered as an [`ErrorBody`];
/// store errors are logged here and reach the client only as a generic
/// message.
#[derive(Debug)]
pub enum ApiError {
    Validation { field: String, message: String },
    BadRequest(String),
    Unauthorized,
    NotFound(String),
    Store,
}

impl ApiError {
    /// Log a store failure and turn it into an opaque 500.
    pub fn store(err: anyhow::Error) -> Self {
        tracing::error!(error = %format!("{:#}", err), "store failure");
        ApiError::Store
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Validation(v) => ApiError::Validation {
                field: v.field,
                message: v.message,
            },
            SyncError::Unauthorized => ApiError::Unauthorized,
            SyncError::NotFound { task_id } => {
                ApiError::NotFound(format!("Task {} not found", task_id))
            }
            SyncError::Store(e) => ApiError::store(e),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: format!("{}: {}", field, message),
                    kind: ErrorKind::Validation,
                    field: Some(field),
                },
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: msg,
                    kind: ErrorKind::Validation,
                    field: None,
                },
            ),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    error: "Unauthorized".to_string(),
                    kind: ErrorKind::Unauthorized,
                    field: None,
                },
            ),
            ApiError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    error: msg,
                    kind: ErrorKind::NotFound,
                    field: None,
                },
            ),
            ApiError::Store => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: "Internal storage error".to_string(),
                    kind: ErrorKind::Store,
                    field: None,
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

/// Dashboard and auth routes, mounted at the root and mirrored under `/api`.
pub fn api_router() -> Router<SharedState> {
    let routes = Router::new()
        .route("/dashboard", get(fetch_dashboard))
        .route("/dashboard/add", post(add_job))
        .route("/dashboard/update", post(move_task))
        .route("/dashboard/update/{task_id}", post(edit_job))
        .route("/dashboard/update-task", post(edit_task))
        .route("/dashboard/delete", post(delete_task))
        .merge(auth_router());

    Router::new()
        .nest("/api", routes.clone())
        .merge(routes)
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

/// Task ids are stringified store ids. Anything else cannot name a record
/// the caller owns.
fn parse_task_id(task_id: &str) -> Result<i64, SyncError> {
    task_id
        .trim()
        .parse::<i64>()
        .map_err(|_| SyncError::not_found(task_id))
}

fn store_err(e: anyhow::Error) -> SyncError {
    SyncError::Store(e)
}

// ── Dashboard operations ──────────────────────────────────────────────

/// Rebuild the caller's dashboard from the store.
pub async fn load_dashboard(db: &DbHandle, owner: &str) -> Result<Dashboard, SyncError> {
    let owner = owner.to_string();
    let records = db
        .call(move |db| db.list_jobs(&owner))
        .await
        .map_err(store_err)?;
    Ok(project(&records))
}

pub async fn add(db: &DbHandle, owner: &str, req: AddJobRequest) -> Result<i64, SyncError> {
    let fields = req.validate()?;
    let owner = owner.to_string();
    let record = db
        .call(move |db| db.insert_job(&owner, &fields))
        .await
        .map_err(store_err)?;
    Ok(record.id)
}

pub async fn relocate(db: &DbHandle, owner: &str, req: MoveTaskRequest) -> Result<(), SyncError> {
    let dest = validate::column_key("destCol", &req.dest_col)?;
    let dest_index = match req.dest_index {
        Some(i) if i < 0 => {
            return Err(validate::ValidationError::new("destIndex", "must not be negative").into());
        }
        Some(i) => Some(i as usize),
        None => None,
    };
    let id = parse_task_id(&req.task_id)?;
    let owner_owned = owner.to_string();
    let moved = db
        .call(move |db| db.move_job(&owner_owned, id, &dest, dest_index))
        .await
        .map_err(store_err)?;
    let record = moved.ok_or_else(|| SyncError::not_found(&req.task_id))?;
    tracing::debug!(
        task_id = %req.task_id,
        source = %req.source_col,
        dest = %record.status,
        position = record.position,
        "job repositioned"
    );
    Ok(())
}

pub async fn edit(
    db: &DbHandle,
    owner: &str,
    task_id: &str,
    fields: JobFields,
) -> Result<(), SyncError> {
    let id = parse_task_id(task_id)?;
    let owner = owner.to_string();
    let updated = db
        .call(move |db| db.update_job(&owner, id, &fields))
        .await
        .map_err(store_err)?;
    match updated {
        Some(_) => Ok(()),
        None => Err(SyncError::not_found(task_id)),
    }
}

pub async fn remove(db: &DbHandle, owner: &str, task_id: &str) -> Result<(), SyncError> {
    let id = parse_task_id(task_id)?;
    let owner = owner.to_string();
    let deleted = db
        .call(move |db| db.delete_job(&owner, id))
        .await
        .map_err(store_err)?;
    if deleted {
        Ok(())
    } else {
        Err(SyncError::not_found(task_id))
    }
}

/// Emit the outcome event for one operation and pass the result through.
fn traced<T>(
    op: &'static str,
    owner: &str,
    task_id: &str,
    result: Result<T, SyncError>,
) -> Result<T, SyncError> {
    match &result {
        Ok(_) => tracing::info!(op, owner, task_id, "dashboard operation succeeded"),
        // Store failures are logged with their cause when mapped to ApiError.
        Err(SyncError::Store(_)) => tracing::warn!(op, owner, task_id, "dashboard operation failed"),
        Err(e) => tracing::warn!(op, owner, task_id, error = %e, "dashboard operation rejected"),
    }
    result
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn fetch_dashboard(
    State(state): State<SharedState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let result = load_dashboard(&state.db, user.owner()).await;
    let dashboard = traced("fetch", user.owner(), "", result)?;
    tracing::debug!(tasks = dashboard.task_count(), "dashboard projected");
    Ok(Json(dashboard))
}

async fn add_job(
    State(state): State<SharedState>,
    user: CurrentUser,
    payload: Result<Json<AddJobRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let result = add(&state.db, user.owner(), req).await;
    let task_id = result.as_ref().map(|id| id.to_string()).unwrap_or_default();
    let id = traced("add", user.owner(), &task_id, result)?;
    Ok(Json(SuccessResponse::created(id)))
}

async fn move_task(
    State(state): State<SharedState>,
    user: CurrentUser,
    payload: Result<Json<MoveTaskRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let task_id = req.task_id.clone();
    let result = relocate(&state.db, user.owner(), req).await;
    traced("move", user.owner(), &task_id, result)?;
    Ok(Json(SuccessResponse::ok()))
}

async fn edit_job(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(task_id): Path<String>,
    payload: Result<Json<EditJobRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let result = match req.validate() {
        Ok(fields) => edit(&state.db, user.owner(), &task_id, fields).await,
        Err(e) => Err(e.into()),
    };
    traced("edit", user.owner(), &task_id, result)?;
    Ok(Json(SuccessResponse::ok()))
}

/// Edit with the task-shaped body of the board's edit dialog. A missing
/// status keeps the job in its current column.
async fn edit_task(
    State(state): State<SharedState>,
    user: CurrentUser,
    payload: Result<Json<TaskEditRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let task_id = req.id.clone();
    let result = edit_task_inner(&state.db, user.owner(), req).await;
    traced("edit", user.owner(), &task_id, result)?;
    Ok(Json(SuccessResponse::ok()))
}

async fn edit_task_inner(db: &DbHandle, owner: &str, req: TaskEditRequest) -> Result<(), SyncError> {
    let status = match req.status {
        Some(status) => status,
        None => {
            let id = parse_task_id(&req.id)?;
            let owner = owner.to_string();
            let current = db
                .call(move |db| db.get_job(&owner, id))
                .await
                .map_err(store_err)?;
            current.ok_or_else(|| SyncError::not_found(&req.id))?.status
        }
    };
    let fields = JobFields::parse(&req.content, &req.company, &status, req.description.as_deref())?;
    edit(db, owner, &req.id, fields).await
}

async fn delete_task(
    State(state): State<SharedState>,
    user: CurrentUser,
    payload: Result<Json<DeleteTaskRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let result = remove(&state.db, user.owner(), &req.task_id).await;
    traced("delete", user.owner(), &req.task_id, result)?;
    Ok(Json(SuccessResponse::ok()))
}

// ── Tests ─────────────────────────────────────────────────────────────
