//! Schema records exchanged with the datasource endpoints.

use log::debug;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::StatwolfResult;
use crate::http::{self, Transport};
use crate::query_spec::{ComputedField, MetricDefinition};

pub const DIMENSION_DATA_TYPE: &str = "String";
pub const METRIC_DATA_TYPE: &str = "Float64";

/// A field definition as pushed to `updateSchema`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldRecord {
    pub name: String,
    pub data_type: String,
    pub is_dimension: bool,
    pub is_filter: bool,
    pub is_visible: bool,
    pub definition: Value,
}

impl FieldRecord {
    /// A computed field exposed as a filterable, visible dimension
    pub fn computed(name: &str, field: &ComputedField) -> Self {
        Self {
            name: name.to_string(),
            data_type: DIMENSION_DATA_TYPE.to_string(),
            is_dimension: true,
            is_filter: true,
            is_visible: true,
            definition: json!({ "inline": field.inline_sql() }),
        }
    }

    /// A custom metric exposed as a visible, non-filterable measure
    pub fn metric(name: &str, metric: &MetricDefinition) -> StatwolfResult<Self> {
        Ok(Self {
            name: name.to_string(),
            data_type: METRIC_DATA_TYPE.to_string(),
            is_dimension: false,
            is_filter: false,
            is_visible: true,
            definition: serde_json::to_value(metric)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct SchemaPayload {
    options: Value,
    fields: Vec<Value>,
}

/// Body of the `updateSchema` request
#[derive(Debug, Clone, Serialize)]
pub struct SchemaUpdate {
    table: String,
    payload: SchemaPayload,
}

impl SchemaUpdate {
    pub fn new(table: &str, fields: Vec<Value>) -> Self {
        Self {
            table: table.to_string(),
            payload: SchemaPayload {
                options: json!({}),
                fields,
            },
        }
    }

    pub fn fields(&self) -> &[Value] {
        &self.payload.fields
    }
}

/// Read-only view of a datasource schema as returned by `getSchema`
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaView {
    sourceid: String,
    meta: Value,
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

impl SchemaView {
    pub fn new(sourceid: &str, meta: Value) -> Self {
        Self {
            sourceid: sourceid.to_string(),
            meta,
        }
    }

    /// Posts `{sourceid}` to `path` and wraps the returned metadata
    pub async fn fetch(transport: &dyn Transport, path: &str, sourceid: &str) -> StatwolfResult<Self> {
        debug!("Fetching schema of {}", sourceid);
        let reply = transport.post(path, &json!({ "sourceid": sourceid })).await?;
        Ok(Self::new(sourceid, http::data(reply)?))
    }

    pub fn sourceid(&self) -> &str {
        &self.sourceid
    }

    pub fn schema(&self) -> Option<&Value> {
        self.meta.get("schema")
    }

    pub fn dimensions(&self) -> Vec<String> {
        string_list(self.meta.get("dimensions"))
    }

    pub fn metrics(&self) -> Vec<String> {
        string_list(self.meta.get("metrics"))
    }

    pub fn filters(&self) -> Vec<String> {
        string_list(self.meta.get("filters"))
    }

    /// The named filter, only when it is listed exactly once
    pub fn filter(&self, name: &str) -> Option<String> {
        let matches: Vec<String> = self.filters().into_iter().filter(|f| f == name).collect();
        match matches.as_slice() {
            [single] => Some(single.clone()),
            _ => None,
        }
    }

    pub fn raw(&self) -> &Value {
        &self.meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_spec::JoinDefinition;

    #[test]
    fn test_computed_record_inlines_join_query() {
        let join = ComputedField::Join(JoinDefinition {
            join_type: "any left".to_string(),
            query: "select v, k".to_string(),
            by: vec!["k".to_string()],
            fields: vec!["v".to_string()],
        });

        let record = serde_json::to_value(FieldRecord::computed("j", &join)).unwrap();
        assert_eq!(
            record,
            json!({
                "name": "j",
                "data_type": "String",
                "is_dimension": true,
                "is_filter": true,
                "is_visible": true,
                "definition": { "inline": "select v, k" },
            })
        );
    }

    #[test]
    fn test_metric_record_carries_definition() {
        let metric = MetricDefinition::Sql {
            sql: "1".to_string(),
            rebuild: None,
        };
        let record = FieldRecord::metric("mySql", &metric).unwrap();
        assert_eq!(record.data_type, "Float64");
        assert!(!record.is_dimension && !record.is_filter && record.is_visible);
        assert_eq!(record.definition, json!({ "type": "sql", "sql": "1" }));
    }

    #[test]
    fn test_view_lists_and_single_filter_lookup() {
        let view = SchemaView::new(
            "src",
            json!({
                "schema": { "field": "the schema" },
                "dimensions": ["country"],
                "metrics": ["visits"],
                "filters": ["country", "device", "device"],
            }),
        );

        assert_eq!(view.schema(), Some(&json!({ "field": "the schema" })));
        assert_eq!(view.dimensions(), vec!["country"]);
        assert_eq!(view.metrics(), vec!["visits"]);
        assert_eq!(view.filter("country"), Some("country".to_string()));
        assert_eq!(view.filter("device"), None);
        assert_eq!(view.filter("missing"), None);
    }
}
