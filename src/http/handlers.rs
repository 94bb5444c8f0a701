//! Metadata endpoints served next to a mounted router

use std::{collections::BTreeMap, sync::Arc};

use axum::{extract::State, Json};
use serde::Serialize;

use crate::{call::CallSignature, router::RouterDefinition};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub rpc_base: String,
    pub calls: BTreeMap<String, CallSignature>,
}

impl DiscoveryResponse {
    pub fn new(rpc_base: impl Into<String>, definition: &RouterDefinition) -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            rpc_base: rpc_base.into(),
            calls: definition
                .iter()
                .map(|(name, call)| (name.to_string(), call.signature()))
                .collect(),
        }
    }
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn discovery(State(discovery): State<Arc<DiscoveryResponse>>) -> Json<DiscoveryResponse> {
    Json(discovery.as_ref().clone())
}
