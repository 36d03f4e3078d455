use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::api::state::AppState;

use super::handlers;

pub fn v1_router() -> Router<AppState> {
    let players = Router::new()
        .route("/", get(handlers::players::list_players))
        .route(
            "/{id}",
            get(handlers::players::get_player).patch(handlers::players::update_player),
        )
        .route("/{id}/refresh", post(handlers::players::refresh_player))
        .route("/{id}/entries", post(handlers::players::log_entry))
        .route("/{id}/entries/last", delete(handlers::players::undo_entry));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/players", players)
        .route("/export", get(handlers::backup::export_store))
        .route("/import", post(handlers::backup::import_store))
}
