//! Application state shared across all HTTP handlers.

use raffle_runtime::RaffleEngine;

/// State handed to every handler.
///
/// # Example
///
/// ```ignore
/// async fn handler(State(state): State<AppState>) -> Result<Json<Vec<Raffle>>, AppError> {
///     Ok(Json(state.engine.list_raffles().await?))
/// }
/// ```
#[derive(Clone, Debug)]
pub struct AppState {
    /// The raffle engine
    pub engine: RaffleEngine,
}

impl AppState {
    /// Wrap an engine.
    #[must_use]
    pub const fn new(engine: RaffleEngine) -> Self {
        Self { engine }
    }
}
