//! Statwolf client library
//!
//! This crate lets applications describe analytical queries against Statwolf
//! datasources with a fluent builder, push computed fields and custom metrics
//! into the datasource schema, and run queries through a sequence of
//! transformation stages.
//!
//! ```no_run
//! use statwolf::{ClientConfig, FluentQuery, MetricArgs, StatwolfClient};
//!
//! # async fn run() -> statwolf::StatwolfResult<()> {
//! let client = StatwolfClient::connect(ClientConfig::from_env()?)?;
//! let source = client.datasource().explore("uploaded_my_test_222").await?;
//!
//! let pipeline = source
//!     .builder()
//!     .custom_metric("myCount", MetricArgs::new().operator("count"))
//!     .metrics(["myCount"])
//!     .steps()
//!     .transform(|mut element, _| {
//!         element.meta.insert("note".into(), "new field".into());
//!         Ok(element)
//!     })
//!     .build();
//!
//! let element = pipeline.execute(None).await?;
//! println!("{} rows", element.dataset.len());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod datasource;
pub mod error;
pub mod fragment;
pub mod http;
pub mod join;
pub mod model_builder;
#[cfg(any(test, feature = "mock"))]
pub mod network_mock;
pub mod pipeline;
pub mod query_builder;
pub mod query_spec;
pub mod schema;

// Re-export main types for convenience
pub use client::StatwolfClient;
pub use config::{ClientConfig, Endpoint};
pub use datasource::{Datasource, DatasourceInstance};
pub use error::{StatwolfError, StatwolfResult};
pub use fragment::{Fragment, FragmentInstance};
pub use http::{HttpTransport, Transport};
pub use join::synthesize_join_sql;
pub use model_builder::{ModelDefinition, ModelDefinitionBuilder};
#[cfg(any(test, feature = "mock"))]
pub use network_mock::MockTransport;
pub use pipeline::{
    Element, FnStage, Pipeline, PipelineBuilder, PipelineDefinition, QueryReply, RemoteQueryStage,
    Stage, StageContext, StageRegistry, Step, StepDefinition, StepSequence,
};
pub use query_builder::{FluentQuery, FluentQueryEditor, Join, MetricArgs};
pub use query_spec::{
    ComputedField, FilterClause, JoinDefinition, MetricDefinition, ModelMetric, NamedEntries,
    QuerySpec, SortDirection, SortEntry, Timeframe,
};
pub use schema::{FieldRecord, SchemaUpdate, SchemaView};
