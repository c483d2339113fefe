/// Admin operations: automation lifecycle, lobby configuration, manual awards and claims.
pub mod admin_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Number pool and draw persistence.
pub mod draw_service;
/// Health check service.
pub mod health_service;
/// Line and bonus pattern detection on card grids.
pub mod patterns;
/// Public service for read-only strategy and score information.
pub mod public_service;
/// Round bootstrap, activation and completion.
pub mod round_service;
/// Append-only score ledger, leaderboard and champion selection.
pub mod scoring_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// Per-game automation controllers.
pub mod strategy_controller;
#[cfg(test)]
pub(crate) mod test_fixtures;
