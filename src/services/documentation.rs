use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the automute sync service.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::reconcile::trigger,
        crate::routes::reconcile::apply_override,
        crate::routes::game::start_game,
        crate::routes::game::get_game,
        crate::routes::game::end_game,
        crate::routes::game::toggle_pause,
        crate::routes::game::link_player,
        crate::routes::game::unlink_player,
        crate::routes::feed::update_voice_state,
        crate::routes::feed::replace_voice_states,
        crate::routes::feed::forget_guild,
        crate::routes::feed::replace_game,
        crate::routes::feed::forget_game,
        crate::routes::feed::update_phase,
        crate::routes::feed::update_player,
        crate::routes::feed::remove_player,
        crate::routes::settings::get_voice_rules,
        crate::routes::settings::set_voice_rules,
        crate::routes::settings::reset_voice_rules,
        crate::routes::settings::get_premium,
        crate::routes::settings::set_premium,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::health::LeaseStoreHealth,
            crate::dto::reconcile::TriggerRequest,
            crate::dto::reconcile::OverrideRequest,
            crate::dto::reconcile::ReconcileResponse,
            crate::dto::game::StartGameRequest,
            crate::dto::game::GameSummary,
            crate::dto::feed::GameSnapshot,
            crate::dto::settings::VoiceRulesResponse,
            crate::state::game::GamePhase,
            crate::state::game::HandlePriority,
            crate::services::policy::VoiceRules,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "reconcile", description = "Reconciliation triggers and forced overrides"),
        (name = "game", description = "Game lifecycle under the game state lease"),
        (name = "feed", description = "Voice presence and game phase ingest"),
        (name = "settings", description = "Per-guild voice rules and premium flag"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_trigger_route() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/guilds/{guild_id}/reconcile"));
        assert!(doc.paths.paths.contains_key("/feed/games/{connect_code}/phase"));
    }
}
