//! The query document sent to the dashboard.
//!
//! A [`QuerySpec`] is plain data: the fluent builders in
//! [`crate::query_builder`] mutate it and the pipeline posts it as the body of
//! the query request. Its serde representation is the wire format, including
//! the positional `field_N`/`operator_N`/`value_N`/`selector_N` filter keys and
//! the `testing.calculated` / `testing.metrics` buckets.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::model_builder::ModelDefinition;

pub const DEFAULT_TAKE: &str = "5000";
pub const DEFAULT_GRANULARITY: &str = "overall";
pub const DEFAULT_PERIOD: &str = "last7days";
pub const DEFAULT_PERIOD_GRANULARITY: &str = "day";
pub const DEFAULT_COMBINATOR: &str = "AND";

/// One filter condition
#[derive(Debug, Clone, PartialEq)]
pub struct FilterClause {
    pub field: String,
    pub operator: String,
    pub value: Value,
    pub no_suggestions: bool,
    pub combinator: String,
}

impl FilterClause {
    pub fn new(field: &str, operator: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            operator: operator.to_string(),
            value: value.into(),
            no_suggestions: true,
            combinator: DEFAULT_COMBINATOR.to_string(),
        }
    }
}

/// Time window of a query; the two shapes replace each other
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timeframe {
    Relative {
        period: String,
        granularity: String,
    },
    Absolute {
        #[serde(rename = "dateFrom")]
        date_from: String,
        #[serde(rename = "dateTo")]
        date_to: String,
    },
}

impl Default for Timeframe {
    fn default() -> Self {
        Timeframe::Relative {
            period: DEFAULT_PERIOD.to_string(),
            granularity: DEFAULT_PERIOD_GRANULARITY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// `(field, direction)`, serialized as a two-element array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortEntry(pub String, pub SortDirection);

/// Projection joined into the source table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinDefinition {
    #[serde(rename = "joinType")]
    pub join_type: String,
    pub query: String,
    pub by: Vec<String>,
    pub fields: Vec<String>,
}

/// A computed field: either a SQL expression or a join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComputedField {
    Sql(String),
    Join(JoinDefinition),
}

impl ComputedField {
    /// The inline SQL pushed into the schema definition
    pub fn inline_sql(&self) -> &str {
        match self {
            ComputedField::Sql(sql) => sql,
            ComputedField::Join(join) => &join.query,
        }
    }
}

/// A metric bound to a predictive model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMetric {
    pub field: String,
    pub store: bool,
    #[serde(default)]
    pub rebuild: bool,
    #[serde(flatten)]
    pub model: ModelDefinition,
}

/// Definition of a custom metric. Exactly one shape is stored per name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MetricDefinition {
    #[serde(rename = "sql")]
    Sql {
        sql: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rebuild: Option<bool>,
    },
    #[serde(rename = "operator")]
    Operator {
        operator: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rebuild: Option<bool>,
    },
    #[serde(rename = "ml")]
    Model(ModelMetric),
    /// A definition with no sql, operator or model; never sent to the server
    #[serde(other)]
    Unrecognized,
}

impl MetricDefinition {
    pub fn is_recognized(&self) -> bool {
        !matches!(self, MetricDefinition::Unrecognized)
    }

    /// Sets the retraining flag; returns false for unrecognized definitions
    pub fn set_rebuild(&mut self, force_training: bool) -> bool {
        match self {
            MetricDefinition::Sql { rebuild, .. } | MetricDefinition::Operator { rebuild, .. } => {
                *rebuild = Some(force_training);
                true
            }
            MetricDefinition::Model(model) => {
                model.rebuild = force_training;
                true
            }
            MetricDefinition::Unrecognized => false,
        }
    }
}

/// Insertion-ordered name → value mapping. Re-inserting a name replaces the
/// value in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedEntries<T> {
    entries: Vec<(String, T)>,
}

impl<T> Default for NamedEntries<T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<T> NamedEntries<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces `name`, returning the previous value
    pub fn insert(&mut self, name: &str, value: T) -> Option<T> {
        match self.entries.iter_mut().find(|(key, _)| key == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((name.to_string(), value));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.iter().find(|(key, _)| key == name).map(|(_, value)| value)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        self.entries
            .iter_mut()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn into_values(self) -> Vec<T> {
        self.entries.into_iter().map(|(_, value)| value).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Serialize> Serialize for NamedEntries<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

struct NamedEntriesVisitor<T>(PhantomData<T>);

impl<'de, T: Deserialize<'de>> Visitor<'de> for NamedEntriesVisitor<T> {
    type Value = NamedEntries<T>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of named entries")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut entries = NamedEntries::new();
        while let Some((key, value)) = access.next_entry::<String, T>()? {
            entries.insert(&key, value);
        }
        Ok(entries)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for NamedEntries<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(NamedEntriesVisitor(PhantomData))
    }
}

/// The `testing` bucket: computed fields and custom metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Testing {
    #[serde(default)]
    pub calculated: NamedEntries<ComputedField>,
    #[serde(default, serialize_with = "serialize_recognized")]
    pub metrics: NamedEntries<MetricDefinition>,
}

fn serialize_recognized<S: Serializer>(
    metrics: &NamedEntries<MetricDefinition>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(None)?;
    for (name, metric) in metrics.iter().filter(|(_, metric)| metric.is_recognized()) {
        map.serialize_entry(name, metric)?;
    }
    map.end()
}

/// Declarative description of an analytical query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    table: String,
    #[serde(default, with = "filter_wire")]
    pub(crate) filter: Vec<FilterClause>,
    #[serde(default)]
    pub(crate) timeframe: Timeframe,
    #[serde(default = "default_granularity")]
    pub(crate) granularity: String,
    #[serde(default)]
    pub(crate) dimensions: Vec<String>,
    #[serde(default)]
    pub(crate) metrics: Vec<String>,
    #[serde(default)]
    pub(crate) sort: Vec<SortEntry>,
    #[serde(default = "default_take")]
    pub(crate) take: String,
    #[serde(default)]
    pub(crate) testing: Testing,
}

fn default_granularity() -> String {
    DEFAULT_GRANULARITY.to_string()
}

fn default_take() -> String {
    DEFAULT_TAKE.to_string()
}

impl QuerySpec {
    /// Creates a spec for `table` with default window, granularity and take
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            filter: Vec::new(),
            timeframe: Timeframe::default(),
            granularity: default_granularity(),
            dimensions: Vec::new(),
            metrics: Vec::new(),
            sort: Vec::new(),
            take: default_take(),
            testing: Testing::default(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn filters(&self) -> &[FilterClause] {
        &self.filter
    }

    pub fn timeframe(&self) -> &Timeframe {
        &self.timeframe
    }

    pub fn granularity(&self) -> &str {
        &self.granularity
    }

    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    pub fn sort(&self) -> &[SortEntry] {
        &self.sort
    }

    pub fn take(&self) -> &str {
        &self.take
    }

    /// Computed fields (`testing.calculated`)
    pub fn computed_fields(&self) -> &NamedEntries<ComputedField> {
        &self.testing.calculated
    }

    /// Custom metrics (`testing.metrics`)
    pub fn custom_metrics(&self) -> &NamedEntries<MetricDefinition> {
        &self.testing.metrics
    }

    /// The wire representation posted to the query endpoint
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// Positional filter encoding shared by queries and fragments
pub(crate) mod filter_wire {
    use super::*;
    use serde::de::Error as _;

    fn wire_value(clause: &FilterClause) -> Value {
        serde_json::json!({
            "value": clause.value,
            "noSuggestions": clause.no_suggestions,
        })
    }

    pub fn serialize<S: Serializer>(clauses: &[FilterClause], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(clauses.len() * 4))?;
        for (index, clause) in clauses.iter().enumerate() {
            map.serialize_entry(&format!("field_{}", index), &clause.field)?;
            map.serialize_entry(&format!("operator_{}", index), &clause.operator)?;
            map.serialize_entry(&format!("value_{}", index), &wire_value(clause))?;
            map.serialize_entry(&format!("selector_{}", index), &clause.combinator)?;
        }
        map.end()
    }

    #[derive(Default)]
    struct Partial {
        field: Option<String>,
        operator: Option<String>,
        value: Value,
        no_suggestions: bool,
        combinator: Option<String>,
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<FilterClause>, D::Error> {
        let raw: serde_json::Map<String, Value> = Deserialize::deserialize(deserializer)?;
        let mut by_index: BTreeMap<usize, Partial> = BTreeMap::new();

        for (key, value) in raw {
            let Some((prefix, index)) = key.rsplit_once('_') else {
                continue;
            };
            let Ok(index) = index.parse::<usize>() else {
                continue;
            };
            let partial = by_index.entry(index).or_default();

            match prefix {
                "field" => partial.field = value.as_str().map(str::to_string),
                "operator" => partial.operator = value.as_str().map(str::to_string),
                "selector" => partial.combinator = value.as_str().map(str::to_string),
                "value" => match value {
                    Value::Object(mut wrapped) if wrapped.contains_key("value") => {
                        partial.no_suggestions = wrapped
                            .get("noSuggestions")
                            .and_then(Value::as_bool)
                            .unwrap_or(false);
                        partial.value = wrapped.remove("value").unwrap_or(Value::Null);
                    }
                    bare => partial.value = bare,
                },
                _ => {}
            }
        }

        by_index
            .into_iter()
            .map(|(index, partial)| {
                Ok(FilterClause {
                    field: partial
                        .field
                        .ok_or_else(|| D::Error::custom(format!("filter {} has no field", index)))?,
                    operator: partial
                        .operator
                        .ok_or_else(|| D::Error::custom(format!("filter {} has no operator", index)))?,
                    value: partial.value,
                    no_suggestions: partial.no_suggestions,
                    combinator: partial
                        .combinator
                        .unwrap_or_else(|| DEFAULT_COMBINATOR.to_string()),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_spec_has_defaults() {
        let spec = QuerySpec::new("events");
        let wire = spec.to_value().unwrap();

        assert_eq!(wire["table"], json!("events"));
        assert_eq!(wire["take"], json!("5000"));
        assert_eq!(wire["granularity"], json!("overall"));
        assert_eq!(wire["timeframe"], json!({ "period": "last7days", "granularity": "day" }));
        assert_eq!(wire["filter"], json!({}));
        assert_eq!(wire["testing"], json!({ "calculated": {}, "metrics": {} }));
    }

    #[test]
    fn test_filters_use_positional_keys() {
        let mut spec = QuerySpec::new("events");
        spec.filter.push(FilterClause::new("country", "==", "IT"));
        spec.filter.push(FilterClause::new("age", ">", 30));

        let wire = spec.to_value().unwrap();
        assert_eq!(
            wire["filter"],
            json!({
                "field_0": "country",
                "operator_0": "==",
                "value_0": { "value": "IT", "noSuggestions": true },
                "selector_0": "AND",
                "field_1": "age",
                "operator_1": ">",
                "value_1": { "value": 30, "noSuggestions": true },
                "selector_1": "AND",
            })
        );
    }

    #[test]
    fn test_spec_reads_back_from_wire() {
        let wire = r#"{
            "table": "ga_132655703",
            "filter": {
                "field_1": "b", "operator_1": "!=", "value_1": { "noSuggestions": true, "value": "y" }, "selector_1": "AND",
                "field_0": "a", "operator_0": "==", "value_0": "x"
            },
            "timeframe": { "dateFrom": "2018-01-01", "dateTo": "2018-01-31" },
            "testing": {
                "calculated": { "z": "1", "a": "2" },
                "metrics": { "m": { "type": "sql", "sql": "1" }, "odd": { "type": "histogram" } }
            }
        }"#;

        let spec: QuerySpec = serde_json::from_str(wire).unwrap();
        assert_eq!(spec.table(), "ga_132655703");
        assert_eq!(spec.filters().len(), 2);
        assert_eq!(spec.filters()[0].field, "a");
        assert!(!spec.filters()[0].no_suggestions);
        assert_eq!(spec.filters()[1].value, json!("y"));
        assert_eq!(
            spec.timeframe(),
            &Timeframe::Absolute {
                date_from: "2018-01-01".to_string(),
                date_to: "2018-01-31".to_string()
            }
        );
        assert_eq!(spec.take(), "5000");
        assert_eq!(spec.computed_fields().names().collect::<Vec<_>>(), vec!["z", "a"]);
        assert_eq!(spec.custom_metrics().get("odd"), Some(&MetricDefinition::Unrecognized));
    }

    #[test]
    fn test_named_entries_replace_in_place() {
        let mut entries = NamedEntries::new();
        entries.insert("a", 1);
        entries.insert("b", 2);
        assert_eq!(entries.insert("a", 3), Some(1));

        let collected: Vec<_> = entries.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        assert_eq!(collected, vec![("a".to_string(), 3), ("b".to_string(), 2)]);
    }

    #[test]
    fn test_metric_definitions_are_tagged() {
        let sql = serde_json::to_value(MetricDefinition::Sql {
            sql: "X".to_string(),
            rebuild: None,
        })
        .unwrap();
        assert_eq!(sql, json!({ "type": "sql", "sql": "X" }));

        let count = serde_json::to_value(MetricDefinition::Operator {
            operator: "count".to_string(),
            field: None,
            rebuild: Some(true),
        })
        .unwrap();
        assert_eq!(count, json!({ "type": "operator", "operator": "count", "rebuild": true }));
    }

    #[test]
    fn test_sort_entries_are_pairs() {
        let mut spec = QuerySpec::new("t");
        spec.sort.push(SortEntry("visits".to_string(), SortDirection::Desc));
        assert_eq!(spec.to_value().unwrap()["sort"], json!([["visits", "desc"]]));
    }
}
