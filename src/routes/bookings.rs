use axum::{middleware, routing::get, Router};

use crate::handlers::bookings::*;
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(list_bookings).post(create_booking))
        .route("/:id", get(get_booking))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
