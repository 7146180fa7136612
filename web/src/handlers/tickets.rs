//! Ticket endpoints: payment proof upload, purchases, reservations and operator
//! decisions.

use crate::error::AppError;
use crate::extractors::Caller;
use crate::state::AppState;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
};
use raffle_core::outcome::{GroupOutcome, Outcome, Warning};
use raffle_core::types::{
    Decision, ProofRef, Purchase, PurchaseId, PurchaseRequest, RaffleId, ReserveRequest, Ticket,
    TicketId,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// DTOs
// ============================================================================

/// Optional `?ext=` override for uploads.
#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    /// File extension, e.g. `pdf`
    pub ext: Option<String>,
}

/// Locator of a stored payment proof.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProofBody {
    /// Locator returned by the upload endpoint
    pub payment_proof: ProofRef,
}

/// Body of `POST /api/raffles/:id/purchases`.
#[derive(Debug, Deserialize)]
pub struct PurchaseBody {
    /// Buyer's full name
    pub full_name: String,
    /// Buyer's identity document
    pub rg: String,
    /// Uploaded payment proof
    pub payment_proof: ProofRef,
    /// Numbers requested
    pub quantity: u32,
}

/// Body of `POST /api/raffles/:id/reservations`.
#[derive(Debug, Deserialize)]
pub struct ReserveBody {
    /// Buyer's full name
    pub full_name: String,
    /// Buyer's identity document
    pub rg: String,
    /// Numbers requested
    pub quantity: u32,
}

/// Purchase or reservation result.
///
/// `is_short` is true when fewer numbers than requested were left.
#[derive(Debug, Serialize, Deserialize)]
pub struct PurchaseResponse {
    /// Shared purchase identifier
    pub purchase_id: PurchaseId,
    /// Quantity asked for
    pub requested: u32,
    /// Quantity actually allocated
    pub allocated: u32,
    /// Whether the purchase was clipped
    pub is_short: bool,
    /// Created tickets
    pub tickets: Vec<Ticket>,
}

impl From<Purchase> for PurchaseResponse {
    fn from(purchase: Purchase) -> Self {
        Self {
            purchase_id: purchase.purchase_id,
            requested: purchase.requested,
            allocated: purchase.allocated(),
            is_short: purchase.is_short(),
            tickets: purchase.tickets,
        }
    }
}

/// Body of `POST /api/raffles/:id/groups/decide`.
#[derive(Debug, Deserialize)]
pub struct GroupDecisionBody {
    /// Payment proof shared by the group
    pub payment_proof: ProofRef,
    /// `approve` or `reject`
    pub decision: Decision,
}

/// A ticket of the group that kept its state.
#[derive(Debug, Serialize, Deserialize)]
pub struct GroupFailureBody {
    /// Ticket left unchanged
    pub ticket_id: TicketId,
    /// Error code
    pub code: String,
    /// Error message
    pub message: String,
}

/// Group decision result.
#[derive(Debug, Serialize, Deserialize)]
pub struct GroupDecisionResponse {
    /// Tickets after the transition
    pub applied: Vec<Ticket>,
    /// Tickets that could not transition
    pub failures: Vec<GroupFailureBody>,
    /// Degraded side effects
    pub warnings: Vec<Warning>,
}

impl From<Outcome<GroupOutcome>> for GroupDecisionResponse {
    fn from(outcome: Outcome<GroupOutcome>) -> Self {
        let failures = outcome
            .value
            .failures
            .into_iter()
            .map(|failure| {
                let error = AppError::from(failure.error);
                GroupFailureBody {
                    ticket_id: failure.ticket_id,
                    code: error.code().to_string(),
                    message: error.message().to_string(),
                }
            })
            .collect();
        Self {
            applied: outcome.value.applied,
            failures,
            warnings: outcome.warnings,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

fn extension_from(params: &UploadParams, headers: &HeaderMap) -> Result<String, AppError> {
    if let Some(ext) = params.ext.as_deref() {
        return Ok(ext.to_string());
    }
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let ext = match content_type.split(';').next().map(str::trim) {
        Some("image/png") => "png",
        Some("image/jpeg") => "jpg",
        Some("application/pdf") => "pdf",
        _ => {
            return Err(AppError::bad_request(
                "unknown payment proof type; pass ?ext= or a png, jpeg or pdf Content-Type",
            ));
        },
    };
    Ok(ext.to_string())
}

/// `POST /api/payment-proofs`: raw body upload.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/payment-proofs \
///   -H "X-Actor-Id: $BUYER" -H "Content-Type: application/pdf" \
///   --data-binary @receipt.pdf
/// ```
///
/// # Errors
///
/// 400 for an unknown type, 422 for an empty or oversized upload.
pub async fn upload_payment_proof(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<ProofBody>), AppError> {
    let extension = extension_from(&params, &headers)?;
    let payment_proof = state
        .engine
        .upload_payment_proof(&actor, body.to_vec(), &extension)
        .await?;
    Ok((StatusCode::CREATED, Json(ProofBody { payment_proof })))
}

/// `POST /api/raffles/:id/purchases`
///
/// # Errors
///
/// 404, 409 `NO_CAPACITY` when sold out, 409 `INVALID_STATE` unless active, 422 for
/// invalid fields,
/// 503 `CONTENTION` when allocation kept colliding.
pub async fn purchase(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<PurchaseBody>,
) -> Result<(StatusCode, Json<PurchaseResponse>), AppError> {
    let request = PurchaseRequest {
        raffle_id: RaffleId::from_uuid(id),
        full_name: body.full_name,
        rg: body.rg,
        payment_proof: body.payment_proof,
        quantity: body.quantity,
    };
    let purchase = state.engine.purchase(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(purchase.into())))
}

/// `POST /api/raffles/:id/reservations`
///
/// # Errors
///
/// Same as [`purchase`].
pub async fn reserve(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ReserveBody>,
) -> Result<(StatusCode, Json<PurchaseResponse>), AppError> {
    let request = ReserveRequest {
        raffle_id: RaffleId::from_uuid(id),
        full_name: body.full_name,
        rg: body.rg,
        quantity: body.quantity,
    };
    let purchase = state.engine.reserve(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(purchase.into())))
}

/// `POST /api/purchases/:id/confirm`
///
/// # Errors
///
/// 403 for someone else's reservation, 404, 409 when the hold lapsed.
pub async fn confirm_reservation(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ProofBody>,
) -> Result<Json<Vec<Ticket>>, AppError> {
    let tickets = state
        .engine
        .confirm_reservation(&actor, PurchaseId::from_uuid(id), body.payment_proof)
        .await?;
    Ok(Json(tickets))
}

/// `GET /api/me/tickets`
///
/// # Errors
///
/// 500 if the store fails.
pub async fn my_tickets(
    Caller(actor): Caller,
    State(state): State<AppState>,
) -> Result<Json<Vec<Ticket>>, AppError> {
    Ok(Json(state.engine.tickets_for_actor(&actor).await?))
}

/// `GET /api/raffles/:id/tickets`, operators only.
///
/// # Errors
///
/// 403, 404.
pub async fn raffle_tickets(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Ticket>>, AppError> {
    Ok(Json(
        state
            .engine
            .raffle_tickets(&actor, RaffleId::from_uuid(id))
            .await?,
    ))
}

/// `POST /api/tickets/:id/approve`
///
/// # Errors
///
/// 403, 404, 409 `ALREADY_DECIDED`.
pub async fn approve_ticket(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Outcome<Ticket>>, AppError> {
    Ok(Json(
        state
            .engine
            .approve_ticket(&actor, TicketId::from_uuid(id))
            .await?,
    ))
}

/// `POST /api/tickets/:id/reject`
///
/// # Errors
///
/// 403, 404, 409 `ALREADY_DECIDED`.
pub async fn reject_ticket(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ticket>, AppError> {
    Ok(Json(
        state
            .engine
            .reject_ticket(&actor, TicketId::from_uuid(id))
            .await?,
    ))
}

/// `POST /api/tickets/:id/delete`: soft delete of an approved ticket.
///
/// # Errors
///
/// 403, 404, 409 unless approved and live.
pub async fn delete_ticket(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ticket>, AppError> {
    Ok(Json(
        state
            .engine
            .soft_delete_ticket(&actor, TicketId::from_uuid(id))
            .await?,
    ))
}

/// `POST /api/tickets/:id/restore`
///
/// # Errors
///
/// 403, 404, 409 `CONFLICT` when the number was sold again meanwhile.
pub async fn restore_ticket(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ticket>, AppError> {
    Ok(Json(
        state
            .engine
            .restore_ticket(&actor, TicketId::from_uuid(id))
            .await?,
    ))
}

/// `POST /api/raffles/:id/groups/decide`: decide every pending ticket paid with
/// one proof. Partial failures are reported per ticket with a 200.
///
/// # Errors
///
/// 403, 404 when no ticket carries the proof, 409 once the raffle is drawn.
pub async fn decide_group(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<GroupDecisionBody>,
) -> Result<Json<GroupDecisionResponse>, AppError> {
    let outcome = state
        .engine
        .decide_group(
            &actor,
            RaffleId::from_uuid(id),
            &body.payment_proof,
            body.decision,
        )
        .await?;
    Ok(Json(outcome.into()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn query_extension_wins_over_content_type() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/png"));
        let params = UploadParams {
            ext: Some("webp".to_string()),
        };
        assert_eq!(extension_from(&params, &headers).unwrap(), "webp");
    }

    #[test]
    fn content_type_maps_to_extension() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/pdf; charset=binary"),
        );
        assert_eq!(
            extension_from(&UploadParams::default(), &headers).unwrap(),
            "pdf"
        );
    }

    #[test]
    fn unknown_type_is_a_bad_request() {
        let err = extension_from(&UploadParams::default(), &HeaderMap::new()).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
