use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod feed;
pub mod game;
pub mod health;
pub mod reconcile;
pub mod settings;

/// Every route tree plus the Swagger UI, bound to `state`.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(reconcile::router())
        .merge(game::router())
        .merge(feed::router())
        .merge(settings::router())
        .merge(docs::router())
        .with_state(state)
}
