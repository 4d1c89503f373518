//! Fluent construction of a [`QuerySpec`].
//!
//! Every mutator lives on the [`FluentQuery`] trait, so the standalone
//! [`FluentQueryEditor`] and the table-bound
//! [`PipelineBuilder`](crate::pipeline::PipelineBuilder) share one chainable
//! surface. Mutators take the builder by value and hand the same builder
//! back, e.g.
//!
//! ```
//! use statwolf::{FluentQuery, FluentQueryEditor, Join, MetricArgs};
//!
//! let editor = FluentQueryEditor::new("uploaded_my_test_222")
//!     .calculated("yolo", "formatDateTime(toDate('1987-04-22'), '%V')")
//!     .custom_metric("myCount", MetricArgs::new().operator("count"))
//!     .join("my join", Join::new("any left").by(["yolo"]).fields(["mytext"]))
//!     .dimensions(["yolo", "mytext"])
//!     .metrics(["myCount"]);
//!
//! assert_eq!(editor.spec().dimensions(), ["yolo", "mytext"]);
//! ```

use log::debug;
use serde_json::Value;

use crate::error::{StatwolfError, StatwolfResult};
use crate::join::synthesize_join_sql;
use crate::model_builder::{ModelDefinition, ModelDefinitionBuilder};
use crate::query_spec::{
    ComputedField, FilterClause, JoinDefinition, MetricDefinition, ModelMetric, QuerySpec,
    SortDirection, SortEntry, Timeframe,
};

/// Arguments of `custom_metric`. `sql` wins over `operator`; `field` only
/// applies to operator metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricArgs {
    sql: Option<String>,
    operator: Option<String>,
    field: Option<String>,
}

impl MetricArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sql(mut self, sql: &str) -> Self {
        self.sql = Some(sql.to_string());
        self
    }

    pub fn operator(mut self, operator: &str) -> Self {
        self.operator = Some(operator.to_string());
        self
    }

    pub fn field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }

    /// Resolves the arguments to exactly one metric shape
    pub fn into_definition(self) -> MetricDefinition {
        match (self.sql, self.operator) {
            (Some(sql), _) => MetricDefinition::Sql { sql, rebuild: None },
            (None, Some(operator)) => MetricDefinition::Operator {
                operator,
                field: self.field,
                rebuild: None,
            },
            (None, None) => MetricDefinition::Unrecognized,
        }
    }
}

/// Arguments of `join`. Without explicit SQL the projection is synthesized
/// from `fields`, `by` and the optional table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    join_type: String,
    by: Vec<String>,
    fields: Vec<String>,
    table: Option<String>,
    sql: Option<String>,
}

impl Join {
    pub fn new(join_type: &str) -> Self {
        Self {
            join_type: join_type.to_string(),
            by: Vec::new(),
            fields: Vec::new(),
            table: None,
            sql: None,
        }
    }

    /// Join keys
    pub fn by<I, S>(mut self, by: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.by = by.into_iter().map(Into::into).collect();
        self
    }

    /// Columns brought in by the join
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn sql(mut self, sql: &str) -> Self {
        self.sql = Some(sql.to_string());
        self
    }

    pub fn into_definition(self) -> JoinDefinition {
        let query = match self.sql {
            Some(sql) => sql,
            None => synthesize_join_sql(&self.fields, &self.by, self.table.as_deref()),
        };

        JoinDefinition {
            join_type: self.join_type,
            query,
            by: self.by,
            fields: self.fields,
        }
    }
}

fn collect_strings<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

fn store_computed(spec: &mut QuerySpec, name: &str, field: ComputedField) {
    if spec.testing.calculated.insert(name, field).is_some() {
        debug!("Computed field '{}' replaced by a later definition", name);
    }
}

fn apply_model(
    spec: &mut QuerySpec,
    name: &str,
    model: Option<ModelDefinition>,
    force_training: bool,
) -> StatwolfResult<()> {
    let metrics = &mut spec.testing.metrics;

    if let Some(model) = model {
        metrics.insert(
            name,
            MetricDefinition::Model(ModelMetric {
                field: name.to_string(),
                store: true,
                rebuild: force_training,
                model,
            }),
        );
        return Ok(());
    }

    match metrics.get_mut(name) {
        Some(metric) => {
            if !metric.set_rebuild(force_training) {
                debug!("Metric '{}' has no recognized shape; rebuild flag not stored", name);
            }
            Ok(())
        }
        None => Err(StatwolfError::Configuration(format!(
            "Metric '{}' is not defined and no model factory was given",
            name
        ))),
    }
}

/// Chainable mutators over a [`QuerySpec`]
pub trait FluentQuery: Sized {
    fn spec(&self) -> &QuerySpec;

    fn spec_mut(&mut self) -> &mut QuerySpec;

    /// Sets an explicit window, replacing any relative one
    fn timeframe(mut self, date_from: &str, date_to: &str) -> Self {
        self.spec_mut().timeframe = Timeframe::Absolute {
            date_from: date_from.to_string(),
            date_to: date_to.to_string(),
        };
        self
    }

    /// Sets a relative window, replacing any explicit one
    fn relative_timeframe(mut self, period: &str, granularity: &str) -> Self {
        self.spec_mut().timeframe = Timeframe::Relative {
            period: period.to_string(),
            granularity: granularity.to_string(),
        };
        self
    }

    fn granularity(mut self, granularity: &str) -> Self {
        self.spec_mut().granularity = granularity.to_string();
        self
    }

    fn dimensions<I, S>(mut self, dimensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec_mut().dimensions = collect_strings(dimensions);
        self
    }

    fn metrics<I, S>(mut self, metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec_mut().metrics = collect_strings(metrics);
        self
    }

    fn sort<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (S, SortDirection)>,
        S: Into<String>,
    {
        self.spec_mut().sort = entries
            .into_iter()
            .map(|(field, direction)| SortEntry(field.into(), direction))
            .collect();
        self
    }

    /// Row limit, kept string-encoded on the wire
    fn take(mut self, amount: usize) -> Self {
        self.spec_mut().take = amount.to_string();
        self
    }

    /// Appends an AND-combined filter at the next position
    fn add_filter(mut self, field: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.spec_mut().filter.push(FilterClause::new(field, operator, value));
        self
    }

    /// Replaces every filter; positions restart at 0
    fn filters<I, F, O, V>(mut self, clauses: I) -> Self
    where
        I: IntoIterator<Item = (F, O, V)>,
        F: AsRef<str>,
        O: AsRef<str>,
        V: Into<Value>,
    {
        self.spec_mut().filter = clauses
            .into_iter()
            .map(|(field, operator, value)| FilterClause::new(field.as_ref(), operator.as_ref(), value))
            .collect();
        self
    }

    /// Registers a SQL computed field
    fn calculated(mut self, name: &str, sql: &str) -> Self {
        store_computed(self.spec_mut(), name, ComputedField::Sql(sql.to_string()));
        self
    }

    fn custom_metric(mut self, name: &str, args: MetricArgs) -> Self {
        self.spec_mut()
            .testing
            .metrics
            .insert(name, args.into_definition());
        self
    }

    /// Registers a join in the computed-field namespace
    fn join(mut self, name: &str, join: Join) -> Self {
        store_computed(self.spec_mut(), name, ComputedField::Join(join.into_definition()));
        self
    }

    /// Sets the retraining flag of an existing metric
    fn model(mut self, name: &str, force_training: bool) -> StatwolfResult<Self> {
        apply_model(self.spec_mut(), name, None, force_training)?;
        Ok(self)
    }

    /// Defines `name` as a model metric built by `factory`
    fn model_with<F>(mut self, name: &str, factory: F, force_training: bool) -> StatwolfResult<Self>
    where
        F: FnOnce(ModelDefinitionBuilder) -> ModelDefinition,
    {
        let model = factory(ModelDefinitionBuilder::new());
        apply_model(self.spec_mut(), name, Some(model), force_training)?;
        Ok(self)
    }
}

/// Standalone editor, used to build one-shot overrides
#[derive(Debug, Clone, PartialEq)]
pub struct FluentQueryEditor {
    spec: QuerySpec,
}

impl FluentQueryEditor {
    pub fn new(table: &str) -> Self {
        Self {
            spec: QuerySpec::new(table),
        }
    }

    pub fn from_spec(spec: QuerySpec) -> Self {
        Self { spec }
    }

    pub fn into_spec(self) -> QuerySpec {
        self.spec
    }
}

impl FluentQuery for FluentQueryEditor {
    fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut QuerySpec {
        &mut self.spec
    }
}

impl AsRef<QuerySpec> for FluentQueryEditor {
    fn as_ref(&self) -> &QuerySpec {
        &self.spec
    }
}
