//! HTTP routes for appending transactions and checking chain integrity.
//!
//! Every handler that touches the ledger runs on the blocking pool: the
//! ledger lock is held for a whole mining run and reloads do file I/O, and
//! neither may park an async worker.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tracing::error;

use crate::error::LedgerError;
use crate::ledger::Ledger;
use crate::storage::BlockRecord;
use crate::transaction::FileEvent;

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Mutex<Ledger>>,
    /// Raised on shutdown to abandon an in-flight seal.
    pub stop: Arc<AtomicBool>,
    /// Fixed at construction, so `/status` never waits on the lock.
    difficulty: usize,
}

impl AppState {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            difficulty: ledger.difficulty(),
            ledger: Arc::new(Mutex::new(ledger)),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/transactions", post(append_transaction))
        .route("/events", post(append_event))
        .route("/blockchain/integrity", get(integrity))
        .route("/blocks", get(list_blocks))
        .route("/blocks/:position", get(get_block))
        .route("/status", get(status))
        .with_state(state)
}

fn lock(ledger: &Mutex<Ledger>) -> MutexGuard<'_, Ledger> {
    ledger.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs `f` against the locked ledger on the blocking pool.
async fn with_ledger<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&mut Ledger, &AtomicBool) -> Result<T, ApiError> + Send + 'static,
{
    let ledger = state.ledger.clone();
    let stop = state.stop.clone();
    tokio::task::spawn_blocking(move || {
        let mut guard = lock(&ledger);
        f(&mut *guard, stop.as_ref())
    })
    .await
    .map_err(|e| {
        error!("ledger task failed: {e}");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "ledger task failed")
    })?
}

/// Error body: `{ "error": "..." }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        let status = match &e {
            LedgerError::IntegrityViolation(_) => StatusCode::CONFLICT,
            LedgerError::SealingCancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => {
                error!("ledger operation failed: {e}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, e.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

async fn append_payload(state: &AppState, payload: Value) -> Result<BlockRecord, ApiError> {
    with_ledger(state, move |ledger, stop| {
        let block = ledger.append_until(payload, stop)?;
        Ok(BlockRecord::from(block))
    })
    .await
}

/// POST /transactions: append any JSON value.
pub async fn append_transaction(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<BlockRecord>), ApiError> {
    let record = append_payload(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// POST /events: append a validated file event.
pub async fn append_event(
    State(state): State<AppState>,
    Json(event): Json<FileEvent>,
) -> Result<(StatusCode, Json<BlockRecord>), ApiError> {
    event
        .validate()
        .map_err(|e| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    let payload = event.to_payload().map_err(LedgerError::from)?;
    let record = append_payload(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /blockchain/integrity: reload from storage and verify every block.
#[derive(Serialize)]
pub struct IntegrityResp {
    pub valid: bool,
    pub blocks: usize,
    pub violation: Option<String>,
}
pub async fn integrity(State(state): State<AppState>) -> Result<Json<IntegrityResp>, ApiError> {
    let resp = with_ledger(&state, |ledger, _| {
        ledger.reload()?;
        let violation = ledger.first_violation();
        Ok(IntegrityResp {
            valid: violation.is_none(),
            blocks: ledger.len(),
            violation: violation.map(|v| v.to_string()),
        })
    })
    .await?;
    Ok(Json(resp))
}

/// GET /blocks
pub async fn list_blocks(
    State(state): State<AppState>,
) -> Result<Json<Vec<BlockRecord>>, ApiError> {
    let records: Vec<BlockRecord> = with_ledger(&state, |ledger, _| {
        ledger.reload()?;
        Ok(ledger.blocks().iter().map(BlockRecord::from).collect())
    })
    .await?;
    Ok(Json(records))
}

/// GET /blocks/:position
pub async fn get_block(
    State(state): State<AppState>,
    Path(position): Path<u64>,
) -> Result<Json<BlockRecord>, ApiError> {
    let record = with_ledger(&state, move |ledger, _| {
        ledger.reload()?;
        ledger
            .get(position)
            .map(BlockRecord::from)
            .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "not found"))
    })
    .await?;
    Ok(Json(record))
}

/// GET /status: build and sealing parameters. Answers without taking the
/// ledger lock, so it stays available while a block is being mined.
#[derive(Serialize)]
pub struct StatusResp {
    pub version: &'static str,
    pub difficulty: usize,
}
pub async fn status(State(state): State<AppState>) -> Json<StatusResp> {
    Json(StatusResp {
        version: env!("CARGO_PKG_VERSION"),
        difficulty: state.difficulty,
    })
}
