//! Demo service served by the binary
//!
//! Two routers are defined separately and merged: `base` (ping, greet) and
//! `user`, which needs an `x-user-id` header to answer.

use axum::http::request::Parts;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    call::{define_call, CallDefinition},
    errors::RpcError,
    router::{merge_routers, Router, RouterDefinition},
    schema::{json, Json, Void},
};

pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone, Default)]
pub struct DemoContext {
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct GreetInput {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct User {
    pub id: String,
}

pub fn ping() -> CallDefinition<Void, Void> {
    define_call(Void, Void)
}

pub fn greet() -> CallDefinition<Json<GreetInput>, Json<String>> {
    define_call(json::<GreetInput>(), json::<String>())
}

pub fn user() -> CallDefinition<Void, Json<User>> {
    define_call(Void, json::<User>())
}

pub fn base_router() -> Router<DemoContext> {
    Router::new()
        .bind("ping", &ping(), |_ctx: DemoContext, _: ()| async { Ok(()) })
        .bind(
            "greet",
            &greet(),
            |_ctx: DemoContext, input: GreetInput| async move {
                Ok(format!("Hello, {}!", input.name))
            },
        )
}

pub fn user_router() -> Router<DemoContext> {
    Router::new().bind("user", &user(), |ctx: DemoContext, _: ()| async move {
        let id = ctx.user_id.ok_or_else(RpcError::unauthorized)?;
        Ok(User { id })
    })
}

pub fn router() -> Router<DemoContext> {
    merge_routers(&base_router(), &user_router())
}

/// Schema-only surface of [`router`], for clients.
pub fn definition() -> RouterDefinition {
    router().definition()
}

pub async fn create_context(parts: Parts) -> anyhow::Result<DemoContext> {
    let user_id = parts
        .headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    Ok(DemoContext { user_id })
}
