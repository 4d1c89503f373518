//! The built-in first stage: runs the query on the dashboard.

use async_trait::async_trait;
use log::debug;
use serde_json::{Map, Value};

use crate::error::{StatwolfError, StatwolfResult};
use crate::pipeline::stage::{Stage, StageContext};
use crate::pipeline::Element;

/// Decoded reply of the query endpoint
#[derive(Debug, Clone, PartialEq)]
pub enum QueryReply {
    /// `Data` was the `false` sentinel
    Rejected,
    /// `Data.hasErrors` was set
    Failed { message: String },
    Rows { meta: Value, data: Vec<Value> },
}

impl QueryReply {
    pub fn decode(reply: &Value) -> StatwolfResult<Self> {
        let payload = reply
            .get("Data")
            .ok_or_else(|| StatwolfError::UnexpectedResponse("query reply has no Data member".to_string()))?;

        match payload {
            Value::Bool(false) => Ok(QueryReply::Rejected),
            Value::Object(map) => {
                if map.get("hasErrors").and_then(Value::as_bool).unwrap_or(false) {
                    let message = match map.get("errorMessage") {
                        Some(Value::String(message)) => message.clone(),
                        Some(other) => other.to_string(),
                        None => String::new(),
                    };
                    return Ok(QueryReply::Failed { message });
                }

                let data = match map.get("data") {
                    Some(Value::Array(rows)) => rows.clone(),
                    None | Some(Value::Null) => Vec::new(),
                    Some(other) => {
                        return Err(StatwolfError::UnexpectedResponse(format!(
                            "query data is not a list: {}",
                            other
                        )))
                    }
                };

                Ok(QueryReply::Rows {
                    meta: map.get("meta").cloned().unwrap_or(Value::Null),
                    data,
                })
            }
            other => Err(StatwolfError::UnexpectedResponse(format!(
                "unexpected query payload: {}",
                other
            ))),
        }
    }

    /// Maps failures to their error kinds and rows to a fresh element
    pub fn into_element(self) -> StatwolfResult<Element> {
        match self {
            QueryReply::Rejected => Err(StatwolfError::authentication_or_request()),
            QueryReply::Failed { message } => Err(StatwolfError::RemoteQuery(message)),
            QueryReply::Rows { meta, data } => {
                let mut element_meta = Map::new();
                element_meta.insert("schema".to_string(), meta);
                Ok(Element {
                    meta: element_meta,
                    dataset: data,
                })
            }
        }
    }
}

/// Posts the effective query to the path bound in its `path` param
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteQueryStage;

impl RemoteQueryStage {
    pub const NAME: &'static str = "remote_query";
}

#[async_trait]
impl Stage for RemoteQueryStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self, _element: Element, context: &StageContext<'_>) -> StatwolfResult<Element> {
        let path = context
            .param("path")
            .and_then(Value::as_str)
            .ok_or_else(|| StatwolfError::Configuration("remote_query stage has no path bound".to_string()))?;

        let body = context.query().to_value()?;
        debug!("Querying {} on {}", context.query().table(), path);

        let reply = context.post(path, &body).await?;
        QueryReply::decode(&reply)?.into_element()
    }
}
