//! Example service showing how routes are registered on the helper.
//!
//! ```text
//! GET    /hello          authenticated greeting
//! POST   /user           validated body echoed back with a page block
//! POST   /token/refresh  exchange a token pair for a new one
//! POST   /token/revoke   revoke the caller's tokens
//! ```

use axum::{
    extract::State,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use service_helper::{app, one_of, prelude::*};
use validator::Validate;

one_of!(user_type, "employee/customer/vendor");
one_of!(user_status, "active/inactive");

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
struct User {
    #[validate(length(min = 1, code = "required"))]
    full_name: String,
    #[validate(custom(function = "user_type"))]
    r#type: String,
    #[validate(custom(function = "user_status"))]
    status: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
struct RefreshRequest {
    #[validate(length(min = 1, code = "required"))]
    access_token: String,
    #[validate(length(min = 1, code = "required"))]
    refresh_token: String,
}

#[tokio::main]
async fn main() {
    app::start(register).await;
}

fn register(server: &mut Server) {
    tracing::info!(
        superuser = %server.state().config_value("superuser.email"),
        "example service configured"
    );

    server
        .protected_route("/hello", get(hello), "")
        .route("/user", post(create_user))
        .route("/token/refresh", post(refresh_token))
        .protected_route("/token/revoke", post(revoke_token), "");
}

async fn hello(principal: PrincipalContext, bag: RequestBag) {
    bag.set_data(json!({ "message": "Hello, World!", "subject": principal.subject }));
}

async fn create_user(bag: RequestBag, ValidatedJson(user): ValidatedJson<User>) {
    let page = bag.page();
    bag.set_data(user);
    bag.set_pagination(PageResponse {
        total_page: page.page_size,
        total_record: page.page,
    });
}

fn token_service(state: &AppState) -> Result<&TokenService, AppError> {
    state
        .tokens
        .as_deref()
        .ok_or_else(|| AppError::internal("Token service is not configured", json!({})))
}

async fn refresh_token(
    State(state): State<AppState>,
    bag: RequestBag,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<(), AppError> {
    let pair = token_service(&state)?
        .refresh(&req.access_token, &req.refresh_token)
        .await?;
    bag.set_data(pair);
    Ok(())
}

async fn revoke_token(
    State(state): State<AppState>,
    principal: PrincipalContext,
) -> Result<(), AppError> {
    token_service(&state)?.revoke(&principal.subject).await?;
    Ok(())
}
