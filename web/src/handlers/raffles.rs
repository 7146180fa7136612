//! Raffle administration, availability and draw endpoints.
//!
//! - `POST /api/raffles`, `GET /api/raffles`
//! - `GET|PUT|DELETE /api/raffles/:id`
//! - `POST /api/raffles/:id/cancel`, `POST /api/raffles/:id/reactivate`
//! - `GET /api/raffles/:id/available`
//! - `POST /api/raffles/:id/draw`

use crate::error::AppError;
use crate::extractors::Caller;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use raffle_core::draw::DrawResult;
use raffle_core::outcome::Outcome;
use raffle_core::types::{NewRaffle, Raffle, RaffleId, RaffleUpdate, TicketNumber};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free numbers of a raffle.
#[derive(Debug, Serialize, Deserialize)]
pub struct AvailableResponse {
    /// How many numbers are free
    pub count: usize,
    /// The free numbers, ascending
    pub numbers: Vec<TicketNumber>,
}

/// Draw request: a chosen number, or nothing for a random draw.
#[derive(Debug, Default, Deserialize)]
pub struct DrawRequest {
    /// Winning number chosen by the operator
    #[serde(default)]
    pub number: Option<u32>,
}

/// Create a raffle.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/raffles \
///   -H "X-Actor-Id: $OPERATOR" -H "X-Actor-Operator: true" \
///   -H "Content-Type: application/json" \
///   -d '{"title": "Mountain bike", "ticket_price": 1000, "total_tickets": 200}'
/// ```
///
/// # Errors
///
/// 403 for buyers, 422 for invalid fields.
pub async fn create_raffle(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Json(input): Json<NewRaffle>,
) -> Result<(StatusCode, Json<Outcome<Raffle>>), AppError> {
    let outcome = state.engine.create_raffle(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// List raffles, newest first.
///
/// # Errors
///
/// 500 if the store fails.
pub async fn list_raffles(State(state): State<AppState>) -> Result<Json<Vec<Raffle>>, AppError> {
    Ok(Json(state.engine.list_raffles().await?))
}

/// One raffle.
///
/// # Errors
///
/// 404 if unknown.
pub async fn get_raffle(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Raffle>, AppError> {
    Ok(Json(state.engine.get_raffle(RaffleId::from_uuid(id)).await?))
}

/// Edit a raffle.
///
/// # Errors
///
/// 403, 404, 409 once completed or when changing the capacity of a raffle with
/// tickets, 422 for invalid fields.
pub async fn update_raffle(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<RaffleUpdate>,
) -> Result<Json<Raffle>, AppError> {
    let raffle = state
        .engine
        .update_raffle(&actor, RaffleId::from_uuid(id), update)
        .await?;
    Ok(Json(raffle))
}

/// Delete a raffle and all its tickets.
///
/// # Errors
///
/// 403, 404.
pub async fn delete_raffle(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Outcome<()>>, AppError> {
    Ok(Json(
        state
            .engine
            .delete_raffle(&actor, RaffleId::from_uuid(id))
            .await?,
    ))
}

/// Stop selling.
///
/// # Errors
///
/// 403, 404, 409 unless active.
pub async fn cancel_raffle(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Raffle>, AppError> {
    Ok(Json(
        state
            .engine
            .cancel_raffle(&actor, RaffleId::from_uuid(id))
            .await?,
    ))
}

/// Resume selling.
///
/// # Errors
///
/// 403, 404, 409 unless cancelled.
pub async fn reactivate_raffle(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Raffle>, AppError> {
    Ok(Json(
        state
            .engine
            .reactivate_raffle(&actor, RaffleId::from_uuid(id))
            .await?,
    ))
}

/// Free numbers.
///
/// # Errors
///
/// 404 if unknown.
pub async fn available_numbers(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AvailableResponse>, AppError> {
    let numbers = state
        .engine
        .available_numbers(RaffleId::from_uuid(id))
        .await?;
    Ok(Json(AvailableResponse {
        count: numbers.len(),
        numbers,
    }))
}

/// Draw the winner: `{"number": 17}` for a manual draw, `{}` for a random one.
///
/// # Errors
///
/// 403, 404, 409 unless active or without approved tickets, 404 when the chosen
/// number is not an approved entry.
pub async fn draw(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<DrawRequest>,
) -> Result<Json<Outcome<DrawResult>>, AppError> {
    let raffle_id = RaffleId::from_uuid(id);
    let outcome = match request.number {
        Some(number) => {
            state
                .engine
                .draw_manual(&actor, raffle_id, TicketNumber::new(number))
                .await?
        },
        None => state.engine.draw_random(&actor, raffle_id).await?,
    };
    Ok(Json(outcome))
}
