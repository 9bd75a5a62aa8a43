//! Streak engine API handlers.
//!
//! Habit ids travel in the `id` query parameter; create/update/confirm
//! bodies are JSON. Every operation is scoped to the authenticated owner.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use habit_tracker::habits::{Confirmation, Habit, HabitCreate, HabitStats, HabitUpdate};
use habit_tracker::rpc::RpcError;

use super::middleware::AuthContext;
use super::{api_error, ApiError, AppState};
use crate::metrics;

#[derive(Debug, Deserialize)]
pub struct HabitIdParams {
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub active_only: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub id: Uuid,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPayload {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HabitListResponse {
    pub habits: Vec<Habit>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub habit: Habit,
    pub confirmation: Confirmation,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub confirmations: Vec<Confirmation>,
    pub total: i64,
}

/// Create a habit with its first deadline armed
pub async fn create_habit(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(payload): Json<HabitCreate>,
) -> Result<(StatusCode, Json<Habit>), ApiError> {
    let habit = state
        .habit_manager
        .create_habit(ctx.user_id, payload)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(habit)))
}

/// List the caller's habits
pub async fn list_habits(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<ListParams>,
) -> Result<Json<HabitListResponse>, ApiError> {
    let habits = state
        .habit_manager
        .list_habits(ctx.user_id, params.active_only.unwrap_or(true))
        .await
        .map_err(api_error)?;
    let total = habits.len();
    Ok(Json(HabitListResponse { habits, total }))
}

/// Fetch one habit
pub async fn get_habit(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<HabitIdParams>,
) -> Result<Json<Habit>, ApiError> {
    let habit = state
        .habit_manager
        .get_habit(params.id, ctx.user_id)
        .await
        .map_err(api_error)?;
    Ok(Json(habit))
}

/// Update a habit; schedule changes re-arm the deadline
pub async fn update_habit(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<HabitIdParams>,
    Json(payload): Json<HabitUpdate>,
) -> Result<Json<Habit>, ApiError> {
    let habit = state
        .habit_manager
        .update_habit(params.id, ctx.user_id, payload)
        .await
        .map_err(api_error)?;
    Ok(Json(habit))
}

/// Soft-delete a habit
pub async fn delete_habit(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<HabitIdParams>,
) -> Result<StatusCode, ApiError> {
    state
        .habit_manager
        .delete_habit(params.id, ctx.user_id)
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Confirm the habit for the current period.
///
/// The notes body is optional: an empty body confirms without notes, so
/// the raw body is parsed by hand rather than through the `Json`
/// extractor (which would reject the empty case).
pub async fn confirm_habit(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<HabitIdParams>,
    body: String,
) -> Result<Json<ConfirmResponse>, ApiError> {
    let notes = if body.trim().is_empty() {
        None
    } else {
        let payload: ConfirmPayload = serde_json::from_str(&body).map_err(|e| {
            api_error(RpcError::invalid_argument(format!(
                "invalid request body: {e}"
            )))
        })?;
        payload.notes
    };

    let (habit, confirmation) = state
        .habit_manager
        .confirm_habit(params.id, ctx.user_id, notes)
        .await
        .map_err(api_error)?;

    metrics::habit_confirmations_total();
    Ok(Json(ConfirmResponse {
        habit,
        confirmation,
    }))
}

/// Page through a habit's confirmation log, newest first
pub async fn habit_history(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let (confirmations, total) = state
        .habit_manager
        .history(
            params.id,
            ctx.user_id,
            params.limit.unwrap_or(30),
            params.offset.unwrap_or(0),
        )
        .await
        .map_err(api_error)?;
    Ok(Json(HistoryResponse {
        confirmations,
        total,
    }))
}

/// Aggregate statistics over a habit's confirmation log
pub async fn habit_stats(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<HabitIdParams>,
) -> Result<Json<HabitStats>, ApiError> {
    let stats = state
        .habit_manager
        .stats(params.id, ctx.user_id)
        .await
        .map_err(api_error)?;
    Ok(Json(stats))
}
