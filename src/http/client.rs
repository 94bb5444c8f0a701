//! reqwest binding: invoke calls of a remote router
//!
//! Three levels of schema awareness are supported. [`RpcClient::call_raw`] knows
//! names only, [`RpcClient::call`] and [`TypedCall`] encode and decode through a
//! [`CallDefinition`], and [`Stubs`] are built from a whole [`RouterDefinition`].

use std::{collections::BTreeMap, fmt, sync::Arc};

use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    StatusCode,
};
use serde_json::Value;
use thiserror::Error;

use crate::{
    call::{CallDefinition, ErasedDefinition},
    router::RouterDefinition,
    schema::{Schema, ValidationError},
};

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with a status other than `200` or `204`.
    #[error("{message}")]
    Status { status: StatusCode, message: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to encode input: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("input rejected by schema: {0}")]
    InvalidInput(#[source] ValidationError),
    #[error("response body is not valid JSON: {0}")]
    InvalidBody(#[source] serde_json::Error),
    #[error("response rejected by schema: {0}")]
    InvalidOutput(#[source] ValidationError),
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(err) => err.status(),
            _ => None,
        }
    }
}

type HeadersProvider = Arc<dyn Fn() -> HeaderMap + Send + Sync>;

#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    base_url: Arc<str>,
    headers: Option<HeadersProvider>,
}

enum Received {
    Content(Vec<u8>),
    NoContent,
}

impl RpcClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: Arc::from(base_url.into()),
            headers: None,
        }
    }

    /// Extra headers for every request. The provider runs again for each request.
    pub fn with_headers<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> HeaderMap + Send + Sync + 'static,
    {
        self.headers = Some(Arc::new(provider));
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name)
    }

    /// Name-only invocation. `Some` input is sent as the JSON body, `None` sends no body.
    /// Returns the decoded JSON for `200` and `None` for `204`.
    pub async fn call_raw(
        &self,
        name: &str,
        input: Option<Value>,
    ) -> Result<Option<Value>, ClientError> {
        match self.send(name, input).await? {
            Received::Content(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(ClientError::InvalidBody),
            Received::NoContent => Ok(None),
        }
    }

    pub async fn call<I: Schema, O: Schema>(
        &self,
        name: &str,
        definition: &CallDefinition<I, O>,
        input: I::Value,
    ) -> Result<O::Value, ClientError> {
        let body = if definition.input().is_void() {
            None
        } else {
            Some(
                definition
                    .input()
                    .encode(&input)
                    .map_err(ClientError::Encode)?,
            )
        };

        let output = definition.output();
        let raw = match self.send(name, body).await? {
            Received::Content(_) if output.is_void() => Value::Null,
            Received::Content(bytes) => {
                serde_json::from_slice(&bytes).map_err(ClientError::InvalidBody)?
            }
            Received::NoContent => Value::Null,
        };

        output.validate(raw).map_err(ClientError::InvalidOutput)
    }

    pub fn bind<I: Schema, O: Schema>(
        &self,
        name: impl Into<String>,
        definition: &CallDefinition<I, O>,
    ) -> TypedCall<I, O> {
        TypedCall {
            client: self.clone(),
            name: Arc::from(name.into()),
            definition: definition.clone(),
        }
    }

    /// One stub per call of `definition`, each capturing its name and schemas.
    pub fn stubs(&self, definition: &RouterDefinition) -> Stubs {
        let stubs = definition
            .iter()
            .map(|(name, call)| {
                (
                    name.to_string(),
                    Stub {
                        client: self.clone(),
                        name: Arc::from(name),
                        definition: Arc::clone(call),
                    },
                )
            })
            .collect();
        Stubs { stubs }
    }

    async fn send(&self, name: &str, body: Option<Value>) -> Result<Received, ClientError> {
        let mut request = self.http.post(self.url(name));

        if let Some(body) = body {
            let payload = serde_json::to_vec(&body).map_err(ClientError::Encode)?;
            request = request
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(payload);
        }
        if let Some(provider) = &self.headers {
            request = request.headers(provider());
        }

        let response = request.send().await?;
        let status = response.status();

        match status {
            StatusCode::OK => Ok(Received::Content(response.bytes().await?.to_vec())),
            StatusCode::NO_CONTENT => Ok(Received::NoContent),
            _ => {
                let body = response.bytes().await.unwrap_or_default();
                Err(ClientError::Status {
                    status,
                    message: error_message(&body),
                })
            }
        }
    }
}

impl fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClient")
            .field("base_url", &self.base_url)
            .field("headers", &self.headers.is_some())
            .finish()
    }
}

fn error_message(body: &[u8]) -> String {
    let parsed: Value =
        serde_json::from_slice(body).unwrap_or_else(|_| Value::Object(Default::default()));
    parsed
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("Unknown error")
        .to_string()
}

/// A client-side handle for one call with its schemas.
pub struct TypedCall<I, O> {
    client: RpcClient,
    name: Arc<str>,
    definition: CallDefinition<I, O>,
}

impl<I: Schema, O: Schema> TypedCall<I, O> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn invoke(&self, input: I::Value) -> Result<O::Value, ClientError> {
        self.client.call(&self.name, &self.definition, input).await
    }
}

impl<I, O> Clone for TypedCall<I, O> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            name: Arc::clone(&self.name),
            definition: self.definition.clone(),
        }
    }
}

#[derive(Clone)]
pub struct Stub {
    client: RpcClient,
    name: Arc<str>,
    definition: Arc<dyn ErasedDefinition>,
}

impl Stub {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Input is validated and re-encoded before sending; output is validated after
    /// receiving. Void inputs never send a body and void outputs yield `None`.
    pub async fn invoke(&self, input: Option<Value>) -> Result<Option<Value>, ClientError> {
        let signature = self.definition.signature();

        let body = match input {
            Some(raw) if !signature.input.void => Some(
                self.definition
                    .normalize_input(raw)
                    .map_err(ClientError::InvalidInput)?,
            ),
            _ => None,
        };

        match self.client.send(&self.name, body).await? {
            Received::Content(_) if signature.output.void => Ok(None),
            Received::Content(bytes) => {
                let raw: Value =
                    serde_json::from_slice(&bytes).map_err(ClientError::InvalidBody)?;
                self.definition
                    .normalize_output(raw)
                    .map(Some)
                    .map_err(ClientError::InvalidOutput)
            }
            Received::NoContent => Ok(None),
        }
    }
}

impl fmt::Debug for Stub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stub")
            .field("name", &self.name)
            .field("signature", &self.definition.signature())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Stubs {
    stubs: BTreeMap<String, Stub>,
}

impl Stubs {
    pub fn get(&self, name: &str) -> Option<&Stub> {
        self.stubs.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stubs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.stubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty()
    }
}
