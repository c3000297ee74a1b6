//! Route definitions.

use super::{handlers::*, websocket::websocket_handler};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Mines: the multi-step lifecycle.
        .route("/mines", get(mines_state_handler))
        .route("/mines/start", post(mines_start_handler))
        .route("/mines/reveal", post(mines_reveal_handler))
        .route("/mines/cashout", post(mines_cashout_handler))
        // Single-roll modes.
        .route("/dice/roll", post(dice_roll_handler))
        .route("/coinflip/flip", post(coinflip_handler))
        // Fairness material.
        .route("/seeds", get(seeds_handler))
        .route("/seeds/client", post(rotate_client_seed_handler))
        .route("/seeds/rotate", post(rotate_server_seed_handler))
        .route("/seeds/:id", get(retired_seed_handler))
        .route("/verify", post(verify_handler))
        // Live settlement feed.
        .route("/ws", get(websocket_handler))
        .with_state(state)
}
