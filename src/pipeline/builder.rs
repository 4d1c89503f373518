use std::fmt;
use std::sync::Arc;

use log::{debug, info, warn};
use serde_json::{json, Value};

use crate::datasource::endpoints;
use crate::error::{StatwolfError, StatwolfResult};
use crate::http::{self, Transport};
use crate::pipeline::sequence::StepSequence;
use crate::query_builder::FluentQuery;
use crate::query_spec::{NamedEntries, QuerySpec};
use crate::schema::{FieldRecord, SchemaUpdate, SchemaView};

/// Fluent query bound to a source table and the datasource endpoints
pub struct PipelineBuilder {
    spec: QuerySpec,
    base_path: String,
    transport: Arc<dyn Transport>,
}

impl PipelineBuilder {
    /// `base_path` is the dashboard-rooted datasource path, e.g. `/root/v1/full`
    pub fn new(table: &str, base_path: &str, transport: Arc<dyn Transport>) -> Self {
        Self::from_spec(QuerySpec::new(table), base_path, transport)
    }

    pub fn from_spec(spec: QuerySpec, base_path: &str, transport: Arc<dyn Transport>) -> Self {
        Self {
            spec,
            base_path: base_path.to_string(),
            transport,
        }
    }

    pub fn table(&self) -> &str {
        self.spec.table()
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    fn path(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_path, endpoint)
    }

    /// Pushes computed fields and custom metrics into the remote schema and
    /// returns the refreshed schema.
    pub async fn update(self) -> StatwolfResult<SchemaView> {
        let table = self.spec.table();
        info!("Updating schema of {}", table);

        let reply = self
            .transport
            .post(&self.path(endpoints::GET_FIELDS), &json!({ "table": table }))
            .await?;
        let remote = match http::data(reply)? {
            Value::Array(fields) => fields,
            other => {
                return Err(StatwolfError::UnexpectedResponse(format!(
                    "field list of {} is not a list: {}",
                    table, other
                )))
            }
        };

        let mut updates: NamedEntries<Value> = NamedEntries::new();
        for field in remote {
            match field.get("name").and_then(Value::as_str).map(str::to_string) {
                Some(name) => {
                    updates.insert(&name, field);
                }
                None => warn!("Ignoring remote field without a name in {}", table),
            }
        }

        for (name, computed) in self.spec.computed_fields().iter() {
            updates.insert(name, serde_json::to_value(FieldRecord::computed(name, computed))?);
        }

        for (name, metric) in self.spec.custom_metrics().iter() {
            if !metric.is_recognized() {
                debug!("Skipping metric '{}' with no sql, operator or model", name);
                continue;
            }
            updates.insert(name, serde_json::to_value(FieldRecord::metric(name, metric)?)?);
        }

        let update = SchemaUpdate::new(table, updates.into_values());
        debug!("Posting {} field definitions for {}", update.fields().len(), table);
        let reply = self
            .transport
            .post(&self.path(endpoints::UPDATE_SCHEMA), &serde_json::to_value(&update)?)
            .await?;
        http::data(reply)?;

        SchemaView::fetch(self.transport.as_ref(), &self.path(endpoints::GET_SCHEMA), table).await
    }

    /// Hands the query to a step sequence starting with the remote query
    pub fn steps(self) -> StepSequence {
        let query_path = self.path(endpoints::QUERY);
        StepSequence::new(self.spec, self.transport, &query_path)
    }
}

impl FluentQuery for PipelineBuilder {
    fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut QuerySpec {
        &mut self.spec
    }
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("spec", &self.spec)
            .field("base_path", &self.base_path)
            .finish()
    }
}
