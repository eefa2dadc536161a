use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::handlers::trips::*;
use crate::middleware::auth::{admin_middleware, auth_middleware};
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let admin = Router::new()
        .route("/", post(create_trip))
        .route("/:id", put(update_trip).delete(delete_trip))
        .route_layer(middleware::from_fn(admin_middleware))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        .route("/", get(list_trips))
        .route("/:id", get(get_trip))
        .merge(admin)
}
