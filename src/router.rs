//! Named call registries and their composition
//!
//! [`Router`] maps call names to bound calls and is what the server mounts.
//! [`RouterDefinition`] maps names to schemas only and is what clients need.
//! Both merge by copying the left side and then overwriting with the right side,
//! so the right-hand entry wins as a whole on name collisions.

use std::{collections::BTreeMap, fmt, future::Future, sync::Arc};

use crate::{
    call::{Call, CallDefinition, ErasedDefinition},
    schema::Schema,
};

pub struct Router<Ctx> {
    calls: BTreeMap<String, Call<Ctx>>,
}

impl<Ctx: Send + 'static> Router<Ctx> {
    pub fn new() -> Self {
        Self {
            calls: BTreeMap::new(),
        }
    }

    /// Registers a call, replacing any call with the same name.
    pub fn call(mut self, name: impl Into<String>, call: Call<Ctx>) -> Self {
        self.calls.insert(name.into(), call);
        self
    }

    pub fn bind<I, O, F, Fut>(
        self,
        name: impl Into<String>,
        definition: &CallDefinition<I, O>,
        handler: F,
    ) -> Self
    where
        I: Schema,
        O: Schema,
        F: Fn(Ctx, I::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O::Value>> + Send + 'static,
    {
        self.call(name, Call::new(definition.clone(), handler))
    }

    pub fn get(&self, name: &str) -> Option<&Call<Ctx>> {
        self.calls.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.calls.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.calls.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Call<Ctx>)> {
        self.calls.iter().map(|(name, call)| (name.as_str(), call))
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Returns a new router with the calls of both; `other` wins on collisions.
    pub fn merge(&self, other: &Router<Ctx>) -> Router<Ctx> {
        let mut calls = self.calls.clone();
        calls.extend(
            other
                .calls
                .iter()
                .map(|(name, call)| (name.clone(), call.clone())),
        );
        Router { calls }
    }

    /// Schema-only view of this router, for clients sharing the same surface.
    pub fn definition(&self) -> RouterDefinition {
        RouterDefinition {
            calls: self
                .calls
                .iter()
                .map(|(name, call)| (name.clone(), call.definition()))
                .collect(),
        }
    }
}

pub fn merge_routers<Ctx: Send + 'static>(a: &Router<Ctx>, b: &Router<Ctx>) -> Router<Ctx> {
    a.merge(b)
}

impl<Ctx: Send + 'static> Default for Router<Ctx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Ctx> Clone for Router<Ctx> {
    fn clone(&self) -> Self {
        Self {
            calls: self.calls.clone(),
        }
    }
}

impl<Ctx> fmt::Debug for Router<Ctx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.calls.iter()).finish()
    }
}

impl<Ctx, N: Into<String>> FromIterator<(N, Call<Ctx>)> for Router<Ctx> {
    fn from_iter<T: IntoIterator<Item = (N, Call<Ctx>)>>(iter: T) -> Self {
        Self {
            calls: iter
                .into_iter()
                .map(|(name, call)| (name.into(), call))
                .collect(),
        }
    }
}

#[derive(Clone, Default)]
pub struct RouterDefinition {
    calls: BTreeMap<String, Arc<dyn ErasedDefinition>>,
}

impl RouterDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define<I: Schema, O: Schema>(
        mut self,
        name: impl Into<String>,
        definition: &CallDefinition<I, O>,
    ) -> Self {
        self.calls.insert(name.into(), Arc::new(definition.clone()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ErasedDefinition>> {
        self.calls.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.calls.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn ErasedDefinition>)> {
        self.calls
            .iter()
            .map(|(name, definition)| (name.as_str(), definition))
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn merge(&self, other: &RouterDefinition) -> RouterDefinition {
        let mut calls = self.calls.clone();
        calls.extend(
            other
                .calls
                .iter()
                .map(|(name, definition)| (name.clone(), Arc::clone(definition))),
        );
        RouterDefinition { calls }
    }
}

impl fmt::Debug for RouterDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.calls
                    .iter()
                    .map(|(name, definition)| (name, definition.signature())),
            )
            .finish()
    }
}
