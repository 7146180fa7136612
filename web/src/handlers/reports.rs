//! Statistics and export endpoints.

use crate::error::AppError;
use crate::extractors::Caller;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use raffle_core::revenue::{GlobalStats, RaffleStats};
use raffle_core::types::{RaffleId, Ticket};
use uuid::Uuid;

/// `GET /api/raffles/:id/stats`
///
/// # Errors
///
/// 404 if unknown.
pub async fn raffle_stats(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RaffleStats>, AppError> {
    Ok(Json(state.engine.raffle_stats(RaffleId::from_uuid(id)).await?))
}

/// `GET /api/raffles/:id/entries`: approved entries ordered by number.
///
/// # Errors
///
/// 403 for buyers, 404 if unknown.
pub async fn approved_entries(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Ticket>>, AppError> {
    Ok(Json(
        state
            .engine
            .approved_entries(&actor, RaffleId::from_uuid(id))
            .await?,
    ))
}

/// `GET /api/stats`
///
/// # Errors
///
/// 403 for buyers.
pub async fn global_stats(
    Caller(actor): Caller,
    State(state): State<AppState>,
) -> Result<Json<GlobalStats>, AppError> {
    Ok(Json(state.engine.global_stats(&actor).await?))
}
