use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document for Bingo Strategy Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::public_stream,
        crate::routes::strategy::start_automation,
        crate::routes::strategy::stop_automation,
        crate::routes::strategy::strategy_state,
        crate::routes::strategy::update_config,
        crate::routes::strategy::claim_card,
        crate::routes::scores::list_scores,
        crate::routes::scores::award_points,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::admin::StartAutomationResponse,
            crate::dto::admin::ActionResponse,
            crate::dto::admin::PatternRuleInput,
            crate::dto::admin::ComboRuleInput,
            crate::dto::admin::BonusRulesInput,
            crate::dto::admin::UpdateStrategyConfigRequest,
            crate::dto::admin::ManualAwardRequest,
            crate::dto::admin::ClaimCardResponse,
            crate::dto::game::GameSummary,
            crate::dto::game::RoundSummary,
            crate::dto::game::ScoreEntrySummary,
            crate::dto::phase::VisibleAutomationPhase,
            crate::dto::phase::ControllerView,
            crate::dto::public::StrategyStateResponse,
            crate::dto::public::ScoresResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::RoundStartedEvent,
            crate::dto::sse::RoundCompletedEvent,
            crate::dto::sse::DrawCreatedEvent,
            crate::dto::sse::ScoreAwardedEvent,
            crate::dto::sse::ChampionSelectedEvent,
            crate::dto::sse::AutomationStoppedEvent,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "strategy", description = "Strategy automation lifecycle and card claims"),
        (name = "scores", description = "Score ledger and leaderboard"),
    )
)]
pub struct ApiDoc;
