use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::handlers::checkout::*;
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(complete_checkout))
        .route("/sessions", post(start_checkout))
        .route("/sessions/:id", get(get_checkout).delete(abort_checkout))
        .route("/sessions/:id/method", post(select_method))
        .route("/sessions/:id/submit", post(submit_checkout))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
