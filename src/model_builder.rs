use serde::{Deserialize, Serialize};

/// Predictive model attached to a custom metric
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDefinition {
    #[serde(default)]
    pub model_type: String,
    #[serde(default)]
    pub target_name: String,
    #[serde(default)]
    pub feature_names: Vec<String>,
}

/// Builder handed to the factory passed to `model_with`
///
/// ```
/// use statwolf::ModelDefinitionBuilder;
///
/// let model = ModelDefinitionBuilder::new()
///     .model_type("linear_regression")
///     .target("yolo")
///     .features(["myavg"])
///     .build();
/// assert_eq!(model.feature_names, vec!["myavg"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ModelDefinitionBuilder {
    definition: ModelDefinition,
}

impl ModelDefinitionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Model family, e.g. `linear_regression`
    pub fn model_type(mut self, model_type: &str) -> Self {
        self.definition.model_type = model_type.to_string();
        self
    }

    /// Column the model predicts
    pub fn target(mut self, target_name: &str) -> Self {
        self.definition.target_name = target_name.to_string();
        self
    }

    /// Columns the model is trained on
    pub fn features<I, S>(mut self, feature_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.definition.feature_names = feature_names.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> ModelDefinition {
        self.definition
    }
}
