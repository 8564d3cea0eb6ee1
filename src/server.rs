//! HTTP surface for recording results and reading bracket state. Every
//! request takes the one service lock, so recomputations never overlap.

use axum::{
    extract::{Path as AxumPath, State as AxumState},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, get_service, post},
    Json, Router,
};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

use crate::bracket::{Bracket, BracketSnapshot};
use crate::config::now_ms;
use crate::error::{BracketError, Result, StoreError};
use crate::store::MatchStore;
use crate::types::{MatchId, MatchOutcome, MatchRecord, MatchType};

pub struct BracketService {
    bracket: Bracket,
    store: Box<dyn MatchStore + Send>,
}

pub type SharedBracketService = Arc<Mutex<BracketService>>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledMatch {
    #[serde(flatten)]
    pub record: MatchRecord,
    pub scheduled_time: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePayload {
    pub bracket: BracketSnapshot,
    pub matches: Vec<ScheduledMatch>,
}

/// Outcome as reported by scorekeeping clients.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportedOutcome {
    Red,
    Blue,
    Tie,
    Unplayed,
}

impl From<ReportedOutcome> for MatchOutcome {
    fn from(outcome: ReportedOutcome) -> Self {
        match outcome {
            ReportedOutcome::Red => MatchOutcome::RedWon,
            ReportedOutcome::Blue => MatchOutcome::BlueWon,
            ReportedOutcome::Tie => MatchOutcome::Tie,
            ReportedOutcome::Unplayed => MatchOutcome::NotPlayed,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultRequest {
    pub outcome: ReportedOutcome,
}

impl BracketService {
    pub fn new(bracket: Bracket, store: Box<dyn MatchStore + Send>) -> Self {
        BracketService { bracket, store }
    }

    pub fn into_shared(self) -> SharedBracketService {
        Arc::new(Mutex::new(self))
    }

    pub fn bracket(&self) -> &Bracket {
        &self.bracket
    }

    pub fn recompute(&mut self, start_time_ms: u64) -> Result<()> {
        self.bracket.update(self.store.as_mut(), start_time_ms)
    }

    /// Stores the outcome of one elimination match and recomputes the bracket.
    pub fn record_result(&mut self, id: MatchId, outcome: MatchOutcome, start_time_ms: u64) -> Result<MatchRecord> {
        let mut record = self
            .store
            .match_by_id(id)?
            .filter(|record| record.match_type == MatchType::Elimination)
            .ok_or(StoreError::MissingMatch(id))?;
        if record.outcome != outcome {
            info!("match {} ({id}): {:?} -> {:?}", record.display_name, record.outcome, outcome);
            record.outcome = outcome;
            self.store.update_match(&record)?;
        }
        self.recompute(start_time_ms)?;
        Ok(record)
    }

    pub fn state(&self) -> Result<StatePayload> {
        let matches = self
            .store
            .matches_by_type(MatchType::Elimination)?
            .into_iter()
            .map(|record| ScheduledMatch {
                scheduled_time: format_scheduled_time(record.scheduled_at_ms),
                record,
            })
            .collect();
        Ok(StatePayload { bracket: self.bracket.snapshot(), matches })
    }
}

fn format_scheduled_time(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|utc| utc.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

fn error_response(err: BracketError) -> (StatusCode, String) {
    let status = match &err {
        BracketError::NotFound(_) | BracketError::Storage(StoreError::MissingMatch(_)) => StatusCode::NOT_FOUND,
        BracketError::Configuration(_) | BracketError::ReferenceIntegrity(_) => StatusCode::CONFLICT,
        BracketError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("request failed: {err}");
    } else {
        warn!("request rejected: {err}");
    }
    (status, err.to_string())
}

pub fn router(state: SharedBracketService, static_dir: Option<PathBuf>) -> Router {
    let router = Router::new()
        .route("/state.json", get(get_state_json))
        .route("/matches/:id/result", post(post_match_result))
        .route("/update", post(post_update));
    let router = match static_dir {
        Some(dir) => router.fallback_service(get_service(ServeDir::new(dir))),
        None => router,
    };
    router.with_state(state)
}

pub async fn serve(state: SharedBracketService, static_dir: Option<PathBuf>, addr: &str) {
    let app = router(state, static_dir);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("bracket server failed to bind {addr}: {e}");
            return;
        }
    };
    info!("bracket server listening at http://{addr}/");
    if let Err(e) = axum::serve(listener, app).await {
        error!("bracket server error: {e}");
    }
}

/// Runs `work` under the service lock on the blocking pool, since every
/// mutation may rewrite the store file.
async fn with_service<T, F>(state: SharedBracketService, work: F) -> std::result::Result<T, (StatusCode, String)>
where
    T: Send + 'static,
    F: FnOnce(&mut BracketService) -> Result<T> + Send + 'static,
{
    let outcome = tokio::task::spawn_blocking(move || {
        let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
        work(&mut guard)
    })
    .await
    .map_err(|e| {
        error!("bracket task failed: {e}");
        (StatusCode::INTERNAL_SERVER_ERROR, "bracket task failed".to_string())
    })?;
    outcome.map_err(error_response)
}

async fn get_state_json(
    AxumState(state): AxumState<SharedBracketService>,
) -> std::result::Result<impl IntoResponse, (StatusCode, String)> {
    let payload = with_service(state, |service| service.state()).await?;
    let body = serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_string());
    Ok((
        [
            ("Content-Type", "application/json"),
            ("Cache-Control", "no-store"),
            ("Pragma", "no-cache"),
            ("Expires", "0"),
        ],
        body,
    ))
}

async fn post_match_result(
    AxumState(state): AxumState<SharedBracketService>,
    AxumPath(id): AxumPath<MatchId>,
    Json(request): Json<ResultRequest>,
) -> std::result::Result<Json<MatchRecord>, (StatusCode, String)> {
    let outcome = MatchOutcome::from(request.outcome);
    with_service(state, move |service| service.record_result(id, outcome, now_ms()))
        .await
        .map(Json)
}

async fn post_update(
    AxumState(state): AxumState<SharedBracketService>,
) -> std::result::Result<Json<BracketSnapshot>, (StatusCode, String)> {
    with_service(state, |service| {
        service.recompute(now_ms())?;
        Ok(service.bracket().snapshot())
    })
    .await
    .map(Json)
}
