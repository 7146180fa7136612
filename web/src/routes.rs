//! Router composition.

use crate::collaborators::MAX_PROOF_BYTES;
use crate::handlers::{self, raffles, reports, tickets};
use crate::state::AppState;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Build the full application router.
///
/// # Routes
///
/// ## Raffles
/// - `POST /api/raffles`, `GET /api/raffles`
/// - `GET|PUT|DELETE /api/raffles/:id`
/// - `POST /api/raffles/:id/cancel`, `POST /api/raffles/:id/reactivate`
/// - `GET /api/raffles/:id/available`
/// - `POST /api/raffles/:id/draw`
///
/// ## Tickets
/// - `POST /api/payment-proofs`
/// - `POST /api/raffles/:id/purchases`, `POST /api/raffles/:id/reservations`
/// - `POST /api/purchases/:id/confirm`
/// - `GET /api/raffles/:id/tickets`, `GET /api/me/tickets`
/// - `POST /api/tickets/:id/{approve,reject,delete,restore}`
/// - `POST /api/raffles/:id/groups/decide`
///
/// ## Reports
/// - `GET /api/raffles/:id/stats`, `GET /api/raffles/:id/entries`, `GET /api/stats`
///
/// ## Probes
/// - `GET /health`, `GET /ready`
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        // Raffles
        .route("/raffles", post(raffles::create_raffle).get(raffles::list_raffles))
        .route(
            "/raffles/:id",
            get(raffles::get_raffle)
                .put(raffles::update_raffle)
                .delete(raffles::delete_raffle),
        )
        .route("/raffles/:id/cancel", post(raffles::cancel_raffle))
        .route("/raffles/:id/reactivate", post(raffles::reactivate_raffle))
        .route("/raffles/:id/available", get(raffles::available_numbers))
        .route("/raffles/:id/draw", post(raffles::draw))
        // Tickets
        .route(
            "/payment-proofs",
            post(tickets::upload_payment_proof).layer(DefaultBodyLimit::max(MAX_PROOF_BYTES)),
        )
        .route("/raffles/:id/purchases", post(tickets::purchase))
        .route("/raffles/:id/reservations", post(tickets::reserve))
        .route("/purchases/:id/confirm", post(tickets::confirm_reservation))
        .route("/raffles/:id/tickets", get(tickets::raffle_tickets))
        .route("/raffles/:id/groups/decide", post(tickets::decide_group))
        .route("/me/tickets", get(tickets::my_tickets))
        .route("/tickets/:id/approve", post(tickets::approve_ticket))
        .route("/tickets/:id/reject", post(tickets::reject_ticket))
        .route("/tickets/:id/delete", post(tickets::delete_ticket))
        .route("/tickets/:id/restore", post(tickets::restore_ticket))
        // Reports
        .route("/raffles/:id/stats", get(reports::raffle_stats))
        .route("/raffles/:id/entries", get(reports::approved_entries))
        .route("/stats", get(reports::global_stats));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
