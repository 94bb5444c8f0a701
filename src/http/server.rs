//! axum binding for a [`Router`]
//!
//! Every call becomes `POST /<name>`. Other methods on a known name answer `405`,
//! unknown names answer `404`. The mounted router is self-contained and can be
//! nested under any prefix by the host application.

use std::{
    future::Future,
    sync::{Arc, OnceLock},
};

use async_trait::async_trait;
use axum::{
    body::to_bytes,
    extract::Request,
    http::{request::Parts, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::post,
    Json,
};
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    call::{Call, Reply},
    errors::{MountError, RpcError, ServerError},
    logging,
    router::Router,
};

/// Request bodies above this size are rejected before JSON parsing.
pub const MAX_INPUT_BYTES: usize = 2 * 1024 * 1024;

/// Builds the per-request context handed to every handler.
#[async_trait]
pub trait ContextFactory<Ctx>: Send + Sync + 'static {
    async fn create(&self, parts: Parts) -> anyhow::Result<Ctx>;
}

#[async_trait]
impl<Ctx, F, Fut> ContextFactory<Ctx> for F
where
    Ctx: Send + 'static,
    F: Fn(Parts) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Ctx>> + Send + 'static,
{
    async fn create(&self, parts: Parts) -> anyhow::Result<Ctx> {
        self(parts).await
    }
}

/// Context factory for services that need nothing from the request.
pub fn no_context() -> impl ContextFactory<()> {
    |_parts: Parts| async { Ok::<(), anyhow::Error>(()) }
}

pub fn mount<Ctx, C>(router: &Router<Ctx>, context: C) -> Result<axum::Router, MountError>
where
    Ctx: Send + 'static,
    C: ContextFactory<Ctx>,
{
    let context: Arc<dyn ContextFactory<Ctx>> = Arc::new(context);
    let mut routes = axum::Router::new();

    for (name, call) in router.iter() {
        validate_call_name(name)?;

        let endpoint = Endpoint {
            name: Arc::from(name),
            input_void: call.signature().input.void,
            call: call.clone(),
            context: Arc::clone(&context),
        };
        let method_router = post(move |request: Request| {
            let endpoint = endpoint.clone();
            async move { endpoint.handle(request).await }
        })
        .fallback(method_not_allowed);

        routes = routes.route(&format!("/{name}"), method_router);
    }

    Ok(routes
        .fallback(not_found)
        .layer(middleware::from_fn(logging::request_logging_middleware)))
}

fn validate_call_name(name: &str) -> Result<(), MountError> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9._~-]+$").expect("call name pattern must compile"));

    if pattern.is_match(name) {
        Ok(())
    } else {
        Err(MountError::InvalidCallName(name.to_string()))
    }
}

async fn not_found() -> RpcError {
    RpcError::not_found()
}

async fn method_not_allowed() -> RpcError {
    RpcError::method_not_allowed()
}

struct Endpoint<Ctx> {
    name: Arc<str>,
    input_void: bool,
    call: Call<Ctx>,
    context: Arc<dyn ContextFactory<Ctx>>,
}

impl<Ctx> Clone for Endpoint<Ctx> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            input_void: self.input_void,
            call: self.call.clone(),
            context: Arc::clone(&self.context),
        }
    }
}

impl<Ctx: Send + 'static> Endpoint<Ctx> {
    async fn handle(self, request: Request) -> Response {
        let (parts, body) = request.into_parts();

        let raw = if self.input_void {
            None
        } else {
            let bytes = match to_bytes(body, MAX_INPUT_BYTES).await {
                Ok(bytes) => bytes,
                Err(_) => {
                    return self.fail(
                        RpcError::bad_request()
                            .with_message("Unable to read request body")
                            .into(),
                        &Value::Null,
                    )
                }
            };
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => Some(value),
                Err(err) => return self.fail(ServerError::invalid_json(&err), &Value::Null),
            }
        };

        let audit_input = logging::redact_audit_params(raw.as_ref());

        let invocation = match self.call.prepare(raw) {
            Ok(invocation) => invocation,
            Err(err) => return self.fail(err.into(), &audit_input),
        };

        let ctx = match self.context.create(parts).await {
            Ok(ctx) => ctx,
            Err(err) => return self.fail(ServerError::classify(err), &audit_input),
        };

        // Detached so a dropped connection does not cancel the handler midway.
        let outcome = match tokio::spawn(invocation(ctx)).await {
            Ok(outcome) => outcome,
            Err(join_err) => Err(anyhow::anyhow!("handler task failed: {join_err}")),
        };

        match outcome {
            Ok(Reply::Empty) => {
                self.audit(StatusCode::NO_CONTENT, &audit_input);
                StatusCode::NO_CONTENT.into_response()
            }
            Ok(Reply::Json(output)) => {
                self.audit(StatusCode::OK, &audit_input);
                (StatusCode::OK, Json(output)).into_response()
            }
            Err(err) => self.fail(ServerError::classify(err), &audit_input),
        }
    }

    fn fail(&self, err: ServerError, audit_input: &Value) -> Response {
        self.audit(err.status(), audit_input);
        err.into_response()
    }

    fn audit(&self, status: StatusCode, input: &Value) {
        let outcome = logging::outcome_for(status);
        if status.is_success() {
            info!(
                call = %self.name,
                input = %input,
                status = status.as_u16(),
                outcome,
                "rpc call audited"
            );
        } else {
            warn!(
                call = %self.name,
                input = %input,
                status = status.as_u16(),
                outcome,
                "rpc call audited"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use axum::{
        body::{Body, Bytes},
        http::{header, Request},
    };
    use http_body_util::BodyExt;
    use schemars::JsonSchema;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        call::{create_call, define_call},
        schema::{json, Issue, Void},
    };

    #[derive(Debug, Serialize, Deserialize, JsonSchema)]
    struct GreetInput {
        name: String,
    }

    fn header_context(name: &'static str) -> impl ContextFactory<String> {
        move |parts: Parts| async move {
            let value = parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string();
            Ok::<String, anyhow::Error>(value)
        }
    }

    fn rpc_v1() -> Router<String> {
        Router::new()
            .call(
                "noop",
                create_call(Void, Void, |_ctx: String, _: ()| async { Ok(()) }),
            )
            .call(
                "version",
                create_call(Void, json::<String>(), |_ctx: String, _: ()| async {
                    Ok("v1".to_string())
                }),
            )
            .call(
                "context",
                create_call(Void, json::<String>(), |ctx: String, _: ()| async move {
                    Ok(format!("you {ctx}"))
                }),
            )
    }

    fn rpc_v2() -> Router<String> {
        let greet_input = json::<GreetInput>().check(|input| {
            if input.name.is_empty() {
                vec![Issue::new("too_small", "name must not be empty").at("name")]
            } else {
                vec![]
            }
        });

        Router::new()
            .call(
                "version",
                create_call(Void, json::<String>(), |_ctx: String, _: ()| async {
                    Ok("v2".to_string())
                }),
            )
            .call(
                "context",
                create_call(Void, json::<String>(), |ctx: String, _: ()| async move {
                    Ok(format!("you {ctx}"))
                }),
            )
            .bind(
                "greet",
                &define_call(greet_input, json::<String>()),
                |_ctx: String, input: GreetInput| async move {
                    Ok(format!("Hello, {}!", input.name))
                },
            )
            .call(
                "forbidden",
                create_call(Void, Void, |_ctx: String, _: ()| async {
                    Err(RpcError::forbidden().into())
                }),
            )
            .call(
                "error",
                create_call(Void, Void, |_ctx: String, _: ()| async {
                    Err(anyhow::anyhow!("boom"))
                }),
            )
    }

    fn app() -> axum::Router {
        axum::Router::new()
            .nest(
                "/v1",
                mount(&rpc_v1(), header_context("x-auth-v1")).expect("mount v1"),
            )
            .nest(
                "/v2",
                mount(&rpc_v2(), header_context("x-auth-v2")).expect("mount v2"),
            )
    }

    async fn send(
        app: axum::Router,
        method: &str,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<&str>,
    ) -> (StatusCode, Option<String>, Bytes) {
        let mut builder = Request::builder().uri(uri).method(method);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let body = match body {
            Some(body) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        let response = app
            .oneshot(builder.body(body).expect("request build"))
            .await
            .expect("request execution");

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        (status, content_type, body)
    }

    fn body_json(body: &Bytes) -> Value {
        serde_json::from_slice(body).expect("valid json response")
    }

    #[tokio::test]
    async fn unknown_call_is_not_found_for_any_method() {
        for method in ["POST", "GET"] {
            let (status, _, body) = send(app(), method, "/v1/not-found", &[], None).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body, "{\"error\":\"Not found\"}");
        }
    }

    #[tokio::test]
    async fn known_call_with_wrong_method_is_not_allowed() {
        for method in ["GET", "PUT", "DELETE"] {
            let (status, _, body) = send(app(), method, "/v1/noop", &[], None).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(body, "{\"error\":\"Method not allowed\"}");
        }
    }

    #[tokio::test]
    async fn calls_are_scoped_to_their_mount() {
        let (status, _, _) = send(app(), "GET", "/v2/noop", &[], None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, _) =
            send(app(), "POST", "/v1/greet", &[], Some(r#"{"name":"John"}"#)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn void_output_responds_no_content() {
        let (status, _, body) = send(app(), "POST", "/v1/noop", &[], None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn void_input_ignores_any_body() {
        let (status, _, body) = send(app(), "POST", "/v1/noop", &[], Some("not json at all")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn json_output_is_encoded() {
        for (uri, expected) in [("/v1/version", "v1"), ("/v2/version", "v2")] {
            let (status, content_type, body) = send(app(), "POST", uri, &[], None).await;
            assert_eq!(status, StatusCode::OK);
            assert!(content_type
                .expect("content type")
                .starts_with("application/json"));
            assert_eq!(body_json(&body), json!(expected));
        }
    }

    #[tokio::test]
    async fn context_is_built_per_mount() {
        let cases = [
            ("/v1/context", "x-auth-v1", "you u1"),
            ("/v1/context", "x-auth-v2", "you "),
            ("/v2/context", "x-auth-v1", "you "),
            ("/v2/context", "x-auth-v2", "you u1"),
        ];
        for (uri, header_name, expected) in cases {
            let (status, _, body) = send(app(), "POST", uri, &[(header_name, "u1")], None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body_json(&body), json!(expected));
        }
    }

    #[tokio::test]
    async fn greet_returns_typed_output() {
        let (status, content_type, body) =
            send(app(), "POST", "/v2/greet", &[], Some(r#"{"name":"John"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type
            .expect("content type")
            .starts_with("application/json"));
        assert_eq!(body_json(&body), json!("Hello, John!"));
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let (status, _, body) = send(app(), "POST", "/v2/greet", &[], Some("{")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body = body_json(&body);
        assert!(body["error"].is_string());
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn missing_body_is_a_bad_request() {
        let (status, _, body) = send(app(), "POST", "/v2/greet", &[], None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body_json(&body)["error"].is_string());
    }

    #[tokio::test]
    async fn schema_violations_carry_details() {
        let (status, _, body) = send(app(), "POST", "/v2/greet", &[], Some("{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body = body_json(&body);
        assert_eq!(body["error"], "Invalid input data");
        assert_eq!(body["details"][0]["path"], json!(["name"]));

        let (status, _, body) = send(app(), "POST", "/v2/greet", &[], Some(r#"{"name":""}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body = body_json(&body);
        assert_eq!(body["error"], "Invalid input data");
        assert_eq!(body["details"][0]["code"], "too_small");
    }

    #[tokio::test]
    async fn rpc_errors_keep_their_status() {
        let (status, _, body) = send(app(), "POST", "/v2/forbidden", &[], None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, "{\"error\":\"Forbidden\"}");
    }

    #[tokio::test]
    async fn unclassified_errors_are_hidden() {
        let (status, _, body) = send(app(), "POST", "/v2/error", &[], None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "{\"error\":\"Internal server error\"}");
        assert!(!String::from_utf8_lossy(&body).contains("boom"));
    }

    #[tokio::test]
    async fn panicking_handler_is_an_internal_error() {
        let router = Router::new().call(
            "explode",
            create_call(Void, Void, |_ctx: (), _: ()| async {
                if true {
                    panic!("handler exploded");
                }
                Ok(())
            }),
        );
        let app = mount(&router, no_context()).expect("mount");

        let (status, _, body) = send(app, "POST", "/explode", &[], None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "{\"error\":\"Internal server error\"}");
    }

    #[tokio::test]
    async fn failing_context_factory_maps_like_a_handler_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let router = Router::new().call(
            "secret",
            create_call(Void, Void, move |_ctx: String, _: ()| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );
        let app = mount(&router, |parts: Parts| async move {
            let user = parts
                .headers
                .get("x-user-id")
                .ok_or_else(RpcError::unauthorized)?;
            Ok::<String, anyhow::Error>(user.to_str()?.to_string())
        })
        .expect("mount");

        let (status, _, body) = send(app.clone(), "POST", "/secret", &[], None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "{\"error\":\"Unauthorized\"}");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let (status, _, _) = send(app, "POST", "/secret", &[("x-user-id", "u1")], None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_input_skips_context_construction() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let app = mount(&rpc_v2(), move |_parts: Parts| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<String, anyhow::Error>(String::new())
            }
        })
        .expect("mount");

        let (status, _, _) = send(app, "POST", "/greet", &[], Some("{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(built.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn invalid_call_names_are_rejected_at_mount() {
        let router = Router::new().call(
            "users/{id}",
            create_call(Void, Void, |_ctx: (), _: ()| async { Ok(()) }),
        );
        let err = mount(&router, no_context()).expect_err("invalid name");
        assert!(matches!(err, MountError::InvalidCallName(name) if name == "users/{id}"));
    }
}
