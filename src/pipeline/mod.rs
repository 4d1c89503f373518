//! Staged execution of a query.
//!
//! A [`PipelineBuilder`] collects a query for one table. Calling `steps()`
//! hands the query to a [`StepSequence`], whose first step is always the
//! [`RemoteQueryStage`]; further stages are appended with `transform`, and
//! `build()` produces a [`Pipeline`]. Each `execute()` threads an [`Element`]
//! through every stage in order, stopping at the first failure.

pub mod builder;
pub mod remote;
pub mod sequence;
pub mod stage;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use builder::PipelineBuilder;
pub use remote::{QueryReply, RemoteQueryStage};
pub use sequence::{Pipeline, PipelineDefinition, StepDefinition, StepSequence};
pub use stage::{FnStage, Stage, StageContext, StageRegistry, Step};

/// The record threaded through the stages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub meta: Map<String, Value>,
    pub dataset: Vec<Value>,
}

impl Element {
    pub fn new() -> Self {
        Self::default()
    }
}
