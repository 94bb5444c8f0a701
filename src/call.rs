//! Call definitions and handler binding
//!
//! A [`CallDefinition`] is the static contract of one named operation: an input
//! schema and an output schema. Binding a handler to it yields a [`Call`], which is
//! type-erased so calls with different shapes can live in one router.

use std::{fmt, future::Future, sync::Arc};

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use crate::schema::{Issue, Schema, ValidationError};

struct Schemas<I, O> {
    input: I,
    output: O,
}

/// Input and output schema of one operation. Cloning shares the schemas.
pub struct CallDefinition<I, O> {
    schemas: Arc<Schemas<I, O>>,
}

pub fn define_call<I: Schema, O: Schema>(input: I, output: O) -> CallDefinition<I, O> {
    CallDefinition {
        schemas: Arc::new(Schemas { input, output }),
    }
}

impl<I: Schema, O: Schema> CallDefinition<I, O> {
    pub fn input(&self) -> &I {
        &self.schemas.input
    }

    pub fn output(&self) -> &O {
        &self.schemas.output
    }

    pub fn signature(&self) -> CallSignature {
        CallSignature {
            input: SchemaInfo::of(self.input()),
            output: SchemaInfo::of(self.output()),
        }
    }
}

impl<I, O> Clone for CallDefinition<I, O> {
    fn clone(&self) -> Self {
        Self {
            schemas: Arc::clone(&self.schemas),
        }
    }
}

impl<I: Schema, O: Schema> fmt::Debug for CallDefinition<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallDefinition")
            .field("signature", &self.signature())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaInfo {
    pub name: String,
    pub void: bool,
    /// JSON Schema of the request or response body.
    pub schema: Value,
}

impl SchemaInfo {
    fn of<S: Schema>(schema: &S) -> Self {
        Self {
            name: schema.name().into_owned(),
            void: schema.is_void(),
            schema: schema.json_schema(),
        }
    }
}

/// What a document generator or client needs to know about a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSignature {
    pub input: SchemaInfo,
    pub output: SchemaInfo,
}

/// Schema-only view of a call with the typed values erased to JSON.
pub trait ErasedDefinition: Send + Sync {
    fn signature(&self) -> CallSignature;

    /// Validates a raw input and re-encodes it in its canonical wire form.
    fn normalize_input(&self, raw: Value) -> Result<Value, ValidationError>;

    /// Validates a raw output and re-encodes it in its canonical wire form.
    fn normalize_output(&self, raw: Value) -> Result<Value, ValidationError>;
}

impl<I: Schema, O: Schema> ErasedDefinition for CallDefinition<I, O> {
    fn signature(&self) -> CallSignature {
        CallDefinition::signature(self)
    }

    fn normalize_input(&self, raw: Value) -> Result<Value, ValidationError> {
        normalize(self.input(), raw)
    }

    fn normalize_output(&self, raw: Value) -> Result<Value, ValidationError> {
        normalize(self.output(), raw)
    }
}

fn normalize<S: Schema>(schema: &S, raw: Value) -> Result<Value, ValidationError> {
    let value = schema.validate(raw)?;
    schema
        .encode(&value)
        .map_err(|err| ValidationError::single(Issue::new("encode_failed", err.to_string())))
}

/// Handler result in wire form.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Empty,
    Json(Value),
}

/// A validated call waiting for its request context.
pub type Invocation<Ctx> = Box<dyn FnOnce(Ctx) -> BoxFuture<'static, anyhow::Result<Reply>> + Send>;

trait ErasedCall<Ctx>: Send + Sync {
    fn definition(&self) -> Arc<dyn ErasedDefinition>;

    fn prepare(self: Arc<Self>, raw: Option<Value>) -> Result<Invocation<Ctx>, ValidationError>;
}

struct BoundCall<I, O, F> {
    definition: CallDefinition<I, O>,
    handler: F,
}

impl<Ctx, I, O, F, Fut> ErasedCall<Ctx> for BoundCall<I, O, F>
where
    Ctx: Send + 'static,
    I: Schema,
    O: Schema,
    F: Fn(Ctx, I::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<O::Value>> + Send + 'static,
{
    fn definition(&self) -> Arc<dyn ErasedDefinition> {
        Arc::new(self.definition.clone())
    }

    fn prepare(self: Arc<Self>, raw: Option<Value>) -> Result<Invocation<Ctx>, ValidationError> {
        let input_schema = self.definition.input();
        let input = if input_schema.is_void() {
            input_schema.validate(Value::Null)?
        } else {
            input_schema.validate(raw.unwrap_or(Value::Null))?
        };

        Ok(Box::new(move |ctx| {
            Box::pin(async move {
                let output = (self.handler)(ctx, input).await?;
                let output_schema = self.definition.output();
                if output_schema.is_void() {
                    return Ok(Reply::Empty);
                }
                Ok(Reply::Json(output_schema.encode(&output)?))
            })
        }))
    }
}

/// A call definition bound to its handler.
pub struct Call<Ctx> {
    inner: Arc<dyn ErasedCall<Ctx>>,
    signature: CallSignature,
}

impl<Ctx: Send + 'static> Call<Ctx> {
    pub fn new<I, O, F, Fut>(definition: CallDefinition<I, O>, handler: F) -> Self
    where
        I: Schema,
        O: Schema,
        F: Fn(Ctx, I::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O::Value>> + Send + 'static,
    {
        let signature = definition.signature();
        Self {
            inner: Arc::new(BoundCall {
                definition,
                handler,
            }),
            signature,
        }
    }

    pub fn signature(&self) -> &CallSignature {
        &self.signature
    }

    pub fn definition(&self) -> Arc<dyn ErasedDefinition> {
        self.inner.definition()
    }

    /// Validates the raw input. The body is ignored entirely for void inputs.
    pub fn prepare(&self, raw: Option<Value>) -> Result<Invocation<Ctx>, ValidationError> {
        Arc::clone(&self.inner).prepare(raw)
    }

    pub async fn invoke(&self, ctx: Ctx, raw: Option<Value>) -> anyhow::Result<Reply> {
        let invocation = self.prepare(raw)?;
        invocation(ctx).await
    }
}

impl<Ctx> Clone for Call<Ctx> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            signature: self.signature.clone(),
        }
    }
}

impl<Ctx> fmt::Debug for Call<Ctx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("signature", &self.signature)
            .finish()
    }
}

pub fn bind_handler<Ctx, I, O, F, Fut>(definition: CallDefinition<I, O>, handler: F) -> Call<Ctx>
where
    Ctx: Send + 'static,
    I: Schema,
    O: Schema,
    F: Fn(Ctx, I::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<O::Value>> + Send + 'static,
{
    Call::new(definition, handler)
}

pub fn create_call<Ctx, I, O, F, Fut>(input: I, output: O, handler: F) -> Call<Ctx>
where
    Ctx: Send + 'static,
    I: Schema,
    O: Schema,
    F: Fn(Ctx, I::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<O::Value>> + Send + 'static,
{
    Call::new(define_call(input, output), handler)
}
