//! Transformation stages and their execution context.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{StatwolfError, StatwolfResult};
use crate::http::Transport;
use crate::pipeline::remote::RemoteQueryStage;
use crate::pipeline::Element;
use crate::query_spec::QuerySpec;

/// What a stage sees while it runs: the transport, its own bound params and
/// the query in effect for this execution.
pub struct StageContext<'a> {
    transport: &'a dyn Transport,
    params: &'a Value,
    query: &'a QuerySpec,
}

impl<'a> StageContext<'a> {
    pub fn new(transport: &'a dyn Transport, params: &'a Value, query: &'a QuerySpec) -> Self {
        Self {
            transport,
            params,
            query,
        }
    }

    pub fn transport(&self) -> &'a dyn Transport {
        self.transport
    }

    pub fn params(&self) -> &'a Value {
        self.params
    }

    /// A single bound parameter
    pub fn param(&self, key: &str) -> Option<&'a Value> {
        self.params.get(key)
    }

    pub fn query(&self) -> &'a QuerySpec {
        self.query
    }

    pub async fn post(&self, path: &str, body: &Value) -> StatwolfResult<Value> {
        self.transport.post(path, body).await
    }

    pub async fn get(&self, path: &str) -> StatwolfResult<Value> {
        self.transport.get(path).await
    }
}

/// One transformation unit of a pipeline
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    /// Consumes the current element and returns its replacement
    async fn run(&self, element: Element, context: &StageContext<'_>) -> StatwolfResult<Element>;
}

/// Stage backed by a plain closure
pub struct FnStage<F> {
    name: String,
    handler: F,
}

impl<F> FnStage<F>
where
    F: Fn(Element, &StageContext<'_>) -> StatwolfResult<Element> + Send + Sync,
{
    pub fn new(name: &str, handler: F) -> Self {
        Self {
            name: name.to_string(),
            handler,
        }
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(Element, &StageContext<'_>) -> StatwolfResult<Element> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, element: Element, context: &StageContext<'_>) -> StatwolfResult<Element> {
        (self.handler)(element, context)
    }
}

/// A stage together with the params bound when it was appended
#[derive(Clone)]
pub struct Step {
    stage: Arc<dyn Stage>,
    params: Value,
    registered_as: Option<String>,
}

impl Step {
    pub fn new(stage: Arc<dyn Stage>, params: Value) -> Self {
        Self {
            stage,
            params,
            registered_as: None,
        }
    }

    /// A step resolved from a [`StageRegistry`] under `name`
    pub fn registered(name: &str, stage: Arc<dyn Stage>, params: Value) -> Self {
        Self {
            stage,
            params,
            registered_as: Some(name.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        self.stage.name()
    }

    /// Registry name of the step, if it was resolved through a registry
    pub fn registered_as(&self) -> Option<&str> {
        self.registered_as.as_deref()
    }

    pub fn params(&self) -> &Value {
        &self.params
    }

    pub(crate) fn stage(&self) -> &dyn Stage {
        self.stage.as_ref()
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("stage", &self.stage.name())
            .field("params", &self.params)
            .field("registered_as", &self.registered_as)
            .finish()
    }
}

/// Named, pre-compiled stages that persisted pipeline definitions refer to
#[derive(Clone)]
pub struct StageRegistry {
    stages: HashMap<String, Arc<dyn Stage>>,
}

impl StageRegistry {
    /// A registry holding the built-in `remote_query` stage
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(RemoteQueryStage::NAME, Arc::new(RemoteQueryStage));
        registry
    }

    pub fn empty() -> Self {
        Self {
            stages: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, stage: Arc<dyn Stage>) -> &mut Self {
        self.stages.insert(name.to_string(), stage);
        self
    }

    /// Registers a closure under `name`
    pub fn register_fn<F>(&mut self, name: &str, handler: F) -> &mut Self
    where
        F: Fn(Element, &StageContext<'_>) -> StatwolfResult<Element> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(FnStage::new(name, handler)))
    }

    pub fn get(&self, name: &str) -> StatwolfResult<Arc<dyn Stage>> {
        self.stages
            .get(name)
            .cloned()
            .ok_or_else(|| StatwolfError::UnknownStage(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stages.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.stages.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageRegistry")
            .field("stages", &self.names())
            .finish()
    }
}
