use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

const SWAGGER_UI_PATH: &str = "/docs";
const OPENAPI_JSON_PATH: &str = "/api-doc/openapi.json";

/// Swagger UI for the strategy and score routes.
pub fn router(state: SharedState) -> Router<SharedState> {
    let mut openapi = ApiDoc::openapi();
    openapi.info.title = "Bingo Strategy Back".to_owned();

    let ui: Router<SharedState> = SwaggerUi::new(SWAGGER_UI_PATH)
        .url(OPENAPI_JSON_PATH, openapi)
        .into();
    ui.with_state(state)
}
