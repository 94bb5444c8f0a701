use std::sync::Arc;

use axum::{routing::get, Router};

pub mod call;
pub mod config;
pub mod demo;
pub mod errors;
pub mod http;
pub mod logging;
pub mod router;
pub mod schema;

pub use call::{bind_handler, create_call, define_call, Call, CallDefinition, CallSignature};
pub use errors::{MountError, RpcError};
pub use http::{
    client::{ClientError, RpcClient},
    server::{mount, ContextFactory},
};
pub use router::{merge_routers, Router as RpcRouter, RouterDefinition};
pub use schema::{json, IsoDateTime, Issue, Json, Schema, ValidationError, Void};

use http::handlers::{self, DiscoveryResponse};

/// Demo service mounted under `mount_path`, plus health and discovery at the root.
///
/// An empty `mount_path` serves the calls at the root.
pub fn build_app(mount_path: &str) -> Result<Router, MountError> {
    let rpc = mount(&demo::router(), demo::create_context)?;
    let rpc_base = if mount_path.is_empty() {
        "/"
    } else {
        mount_path
    };
    let discovery = Arc::new(DiscoveryResponse::new(rpc_base, &demo::definition()));

    let meta = Router::new()
        .route("/health", get(handlers::health))
        .route("/.well-known/rpc", get(handlers::discovery))
        .with_state(discovery);

    if mount_path.is_empty() {
        Ok(meta.merge(rpc))
    } else {
        Ok(meta.nest(mount_path, rpc))
    }
}
