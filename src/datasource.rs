//! Datasource service: listing sources, reading their schema and starting
//! pipelines on them.

use std::fmt;
use std::sync::Arc;

use log::debug;
use serde_json::{json, Value};

use crate::config::Endpoint;
use crate::error::{StatwolfError, StatwolfResult};
use crate::http::{self, Transport};
use crate::pipeline::PipelineBuilder;
use crate::query_spec::QuerySpec;
use crate::schema::SchemaView;

/// Datasource API paths
pub mod endpoints {
    /// Dashboard-relative root of the datasource API
    pub const BASE: &str = "/v1/full";
    pub const LIST_SCHEMAS: &str = "/listSchemas";
    pub const GET_SCHEMA: &str = "/getSchema";
    pub const GET_FIELDS: &str = "/getFields";
    pub const UPDATE_SCHEMA: &str = "/updateSchema";
    pub const QUERY: &str = "/query";
}

/// Entry point to the datasources of a dashboard
#[derive(Clone)]
pub struct Datasource {
    transport: Arc<dyn Transport>,
    base_path: String,
}

impl Datasource {
    pub fn new(transport: Arc<dyn Transport>, endpoint: &Endpoint) -> Self {
        Self {
            transport,
            base_path: endpoint.to_dashboard(endpoints::BASE),
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    fn path(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_path, endpoint)
    }

    /// Ids of every datasource visible to the account
    pub async fn list(&self) -> StatwolfResult<Vec<String>> {
        debug!("Listing datasources");
        let reply = self
            .transport
            .post(&self.path(endpoints::LIST_SCHEMAS), &json!({}))
            .await?;

        match http::data(reply)? {
            Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()),
            other => Err(StatwolfError::UnexpectedResponse(format!(
                "datasource list is not a list: {}",
                other
            ))),
        }
    }

    /// Loads the schema of `sourceid`
    pub async fn explore(&self, sourceid: &str) -> StatwolfResult<DatasourceInstance> {
        let view = SchemaView::fetch(self.transport.as_ref(), &self.path(endpoints::GET_SCHEMA), sourceid).await?;
        Ok(DatasourceInstance {
            view,
            datasource: self.clone(),
        })
    }

    /// A pipeline builder for `table` with a default query
    pub fn builder(&self, table: &str) -> PipelineBuilder {
        PipelineBuilder::new(table, &self.base_path, Arc::clone(&self.transport))
    }

    /// A pipeline builder seeded from an existing query
    pub fn pipeline(&self, spec: QuerySpec) -> PipelineBuilder {
        PipelineBuilder::from_spec(spec, &self.base_path, Arc::clone(&self.transport))
    }
}

impl fmt::Debug for Datasource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datasource")
            .field("base_path", &self.base_path)
            .finish()
    }
}

/// A datasource whose schema has been loaded
#[derive(Debug, Clone)]
pub struct DatasourceInstance {
    view: SchemaView,
    datasource: Datasource,
}

impl DatasourceInstance {
    pub fn sourceid(&self) -> &str {
        self.view.sourceid()
    }

    pub fn view(&self) -> &SchemaView {
        &self.view
    }

    pub fn schema(&self) -> Option<&Value> {
        self.view.schema()
    }

    pub fn dimensions(&self) -> Vec<String> {
        self.view.dimensions()
    }

    pub fn metrics(&self) -> Vec<String> {
        self.view.metrics()
    }

    pub fn filters(&self) -> Vec<String> {
        self.view.filters()
    }

    pub fn filter(&self, name: &str) -> Option<String> {
        self.view.filter(name)
    }

    pub fn raw(&self) -> &Value {
        self.view.raw()
    }

    /// Starts a query on this source
    pub fn builder(&self) -> PipelineBuilder {
        self.datasource.builder(self.sourceid())
    }
}
