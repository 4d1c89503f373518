use std::fmt;
use std::sync::Arc;

use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::StatwolfResult;
use crate::http::Transport;
use crate::pipeline::remote::RemoteQueryStage;
use crate::pipeline::stage::{FnStage, Stage, StageContext, StageRegistry, Step};
use crate::pipeline::Element;
use crate::query_builder::FluentQueryEditor;
use crate::query_spec::QuerySpec;

fn empty_params() -> Value {
    Value::Object(Map::new())
}

/// A persisted transform step: a registered stage name plus its params
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub stage: String,
    #[serde(default = "empty_params")]
    pub params: Value,
}

/// Serializable list of transform steps, resolved against a [`StageRegistry`].
/// The remote query step is implicit and never listed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

impl PipelineDefinition {
    pub fn from_json(json: &str) -> StatwolfResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> StatwolfResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Ordered steps under construction, bound to a query
pub struct StepSequence {
    spec: QuerySpec,
    transport: Arc<dyn Transport>,
    steps: Vec<Step>,
}

impl StepSequence {
    /// Starts a sequence whose first step queries `query_path`
    pub fn new(spec: QuerySpec, transport: Arc<dyn Transport>, query_path: &str) -> Self {
        let remote = Step::new(Arc::new(RemoteQueryStage), json!({ "path": query_path }));
        Self {
            spec,
            transport,
            steps: vec![remote],
        }
    }

    /// Appends a closure stage with no params
    pub fn transform<F>(self, handler: F) -> Self
    where
        F: Fn(Element, &StageContext<'_>) -> StatwolfResult<Element> + Send + Sync + 'static,
    {
        self.transform_with(handler, empty_params())
    }

    /// Appends a closure stage; `params` is owned by the step from here on
    pub fn transform_with<F>(self, handler: F, params: Value) -> Self
    where
        F: Fn(Element, &StageContext<'_>) -> StatwolfResult<Element> + Send + Sync + 'static,
    {
        let name = format!("transform_{}", self.steps.len());
        self.stage(Arc::new(FnStage::new(&name, handler)), params)
    }

    /// Appends any stage, including ones that call the transport themselves
    pub fn stage(mut self, stage: Arc<dyn Stage>, params: Value) -> Self {
        self.steps.push(Step::new(stage, params));
        self
    }

    /// Appends the registered stage `name`
    pub fn transform_named(mut self, registry: &StageRegistry, name: &str, params: Value) -> StatwolfResult<Self> {
        let stage = registry.get(name)?;
        self.steps.push(Step::registered(name, stage, params));
        Ok(self)
    }

    /// Appends every step of a persisted definition, in order
    pub fn with_definition(
        mut self,
        registry: &StageRegistry,
        definition: &PipelineDefinition,
    ) -> StatwolfResult<Self> {
        for step in &definition.steps {
            self = self.transform_named(registry, &step.stage, step.params.clone())?;
        }
        Ok(self)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Moves the query and the steps into a runnable pipeline
    pub fn build(self) -> Pipeline {
        Pipeline {
            spec: self.spec,
            transport: self.transport,
            steps: self.steps,
        }
    }
}

impl fmt::Debug for StepSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepSequence")
            .field("table", &self.spec.table())
            .field("steps", &self.steps)
            .finish()
    }
}

/// A query plus its stages, ready to run any number of times
pub struct Pipeline {
    spec: QuerySpec,
    transport: Arc<dyn Transport>,
    steps: Vec<Step>,
}

impl Pipeline {
    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// A detached editor seeded from this pipeline's query, for overrides
    pub fn query(&self) -> FluentQueryEditor {
        FluentQueryEditor::from_spec(self.spec.clone())
    }

    /// The registry-resolved steps as a persistable definition. Closure and
    /// ad hoc stages have no registry name and are left out.
    pub fn definition(&self) -> PipelineDefinition {
        let mut steps = Vec::new();
        for step in self.steps.iter().skip(1) {
            match step.registered_as() {
                Some(name) => steps.push(StepDefinition {
                    stage: name.to_string(),
                    params: step.params().clone(),
                }),
                None => debug!("Step '{}' is not registered and is not persisted", step.name()),
            }
        }
        PipelineDefinition { steps }
    }

    /// Runs every stage in order from an empty element. `override_query`
    /// replaces the pipeline's own query for the whole run.
    pub async fn execute(&self, override_query: Option<&QuerySpec>) -> StatwolfResult<Element> {
        let query = override_query.unwrap_or(&self.spec);
        info!(
            "Executing pipeline on {} with {} steps{}",
            query.table(),
            self.steps.len(),
            if override_query.is_some() { " (override)" } else { "" }
        );

        let mut element = Element::new();
        for (index, step) in self.steps.iter().enumerate() {
            let context = StageContext::new(self.transport.as_ref(), step.params(), query);
            debug!("Running step {} '{}'", index, step.name());

            element = match step.stage().run(element, &context).await {
                Ok(next) => next,
                Err(e) => {
                    error!("Step {} '{}' failed: {}", index, step.name(), e);
                    return Err(e);
                }
            };
        }

        info!("Pipeline completed with {} rows", element.dataset.len());
        Ok(element)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("spec", &self.spec)
            .field("steps", &self.steps)
            .finish()
    }
}
