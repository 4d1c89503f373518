//! Saved dashboard fragments.
//!
//! A fragment is a stored query on the dashboard. [`FragmentInstance`] keeps a
//! local overlay of parameters; only the keys set through its methods are
//! sent, and the fragment's own values fill in the rest on the server side.
//! Fragment replies are plain lists, not `Data` envelopes.

use std::fmt;
use std::sync::Arc;

use log::debug;
use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::datasource::{Datasource, DatasourceInstance};
use crate::error::{StatwolfError, StatwolfResult};
use crate::http::Transport;
use crate::query_spec::{filter_wire, FilterClause, Timeframe};

/// Keys of the discovered fragment that `params()` reports
const DISCOVERED_KEYS: [&str; 5] = ["filter", "timeframe", "metrics", "dimensions", "take"];

fn serialize_filter<S: Serializer>(clauses: &Option<Vec<FilterClause>>, serializer: S) -> Result<S::Ok, S::Error> {
    match clauses {
        Some(clauses) => filter_wire::serialize(clauses, serializer),
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
struct FragmentParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    timeframe: Option<Timeframe>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    crosstab: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    take: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_filter")]
    filter: Option<Vec<FilterClause>>,
}

/// The fragment service
#[derive(Clone)]
pub struct Fragment {
    transport: Arc<dyn Transport>,
    datasource: Datasource,
}

impl Fragment {
    pub fn new(transport: Arc<dyn Transport>, datasource: Datasource) -> Self {
        Self { transport, datasource }
    }

    pub fn explore(&self, fragment_id: &str) -> FragmentInstance {
        FragmentInstance {
            base_url: format!("/fragment/{}", fragment_id),
            params: FragmentParams::default(),
            fragment: self.clone(),
        }
    }
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fragment")
            .field("datasource", &self.datasource)
            .finish()
    }
}

/// One fragment plus the parameters overriding it
#[derive(Debug, Clone)]
pub struct FragmentInstance {
    base_url: String,
    params: FragmentParams,
    fragment: Fragment,
}

fn collect_strings<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

fn first(reply: Value, what: &str) -> StatwolfResult<Value> {
    match reply {
        Value::Array(mut items) if !items.is_empty() => Ok(items.swap_remove(0)),
        other => Err(StatwolfError::UnexpectedResponse(format!(
            "{} reply is not a non-empty list: {}",
            what, other
        ))),
    }
}

impl FragmentInstance {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeframe(mut self, date_from: &str, date_to: &str) -> Self {
        self.params.timeframe = Some(Timeframe::Absolute {
            date_from: date_from.to_string(),
            date_to: date_to.to_string(),
        });
        self
    }

    pub fn metrics<I, S>(mut self, metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params.metrics = Some(collect_strings(metrics));
        self
    }

    pub fn group_by<I, S>(mut self, dimensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params.dimensions = Some(collect_strings(dimensions));
        self
    }

    pub fn pivot_by<I, S>(mut self, dimensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params.crosstab = Some(collect_strings(dimensions));
        self
    }

    pub fn take(mut self, amount: usize) -> Self {
        self.params.take = Some(amount.to_string());
        self
    }

    pub fn add_filter(mut self, field: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.params
            .filter
            .get_or_insert_with(Vec::new)
            .push(FilterClause::new(field, operator, value));
        self
    }

    /// Replaces every local filter; positions restart at 0. An empty list
    /// drops the local filter so the fragment's own one applies.
    pub fn filters<I, F, O, V>(mut self, clauses: I) -> Self
    where
        I: IntoIterator<Item = (F, O, V)>,
        F: AsRef<str>,
        O: AsRef<str>,
        V: Into<Value>,
    {
        let clauses: Vec<FilterClause> = clauses
            .into_iter()
            .map(|(field, operator, value)| FilterClause::new(field.as_ref(), operator.as_ref(), value))
            .collect();
        self.params.filter = if clauses.is_empty() { None } else { Some(clauses) };
        self
    }

    /// The locally set parameters in wire form
    pub fn local_params(&self) -> StatwolfResult<Value> {
        Ok(serde_json::to_value(&self.params)?)
    }

    /// The fragment's stored parameters overlaid with the local ones
    pub async fn params(&self) -> StatwolfResult<Value> {
        let discovered = self.discover().await?;

        let mut merged = Map::new();
        for key in DISCOVERED_KEYS {
            if let Some(value) = discovered.get(key) {
                merged.insert(key.to_string(), value.clone());
            }
        }

        if let Value::Object(local) = self.local_params()? {
            merged.extend(local);
        }

        Ok(Value::Object(merged))
    }

    /// Rows of the fragment under the current parameters
    pub async fn data(&self) -> StatwolfResult<Value> {
        let response = first(self.request("query").await?, "query")?;
        response
            .get("data")
            .and_then(|data| data.get("data"))
            .cloned()
            .ok_or_else(|| StatwolfError::UnexpectedResponse("fragment reply has no data.data".to_string()))
    }

    /// Saves the current parameters as a new fragment
    pub async fn create(&self) -> StatwolfResult<FragmentInstance> {
        let response = first(self.request("extend").await?, "extend")?;
        let fragment_id = response
            .get("fragmentId")
            .and_then(Value::as_str)
            .ok_or_else(|| StatwolfError::UnexpectedResponse("extend reply has no fragmentId".to_string()))?;

        Ok(self.fragment.explore(fragment_id))
    }

    /// Path of a newly created fragment holding the current parameters
    pub async fn link(&self) -> StatwolfResult<String> {
        Ok(self.create().await?.base_url)
    }

    /// The datasource the fragment queries
    pub async fn current_datasource(&self) -> StatwolfResult<DatasourceInstance> {
        let discovered = self.discover().await?;
        let table = discovered
            .get("table")
            .and_then(Value::as_str)
            .ok_or_else(|| StatwolfError::UnexpectedResponse("fragment has no table".to_string()))?;

        self.fragment.datasource.explore(table).await
    }

    async fn request(&self, mode: &str) -> StatwolfResult<Value> {
        debug!("Fragment {} request '{}'", self.base_url, mode);
        let body = json!({ "mode": mode, "params": self.local_params()? });
        self.fragment.transport.post(&self.base_url, &body).await
    }

    async fn discover(&self) -> StatwolfResult<Value> {
        let reply = self
            .fragment
            .transport
            .get(&format!("{}/discover", self.base_url))
            .await?;
        first(reply, "discover")
    }
}
