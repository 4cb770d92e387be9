use render_fidelity_common::config::{ParamChange, VariantSpec};
use serde_json::{Map, Number, Value};
use std::path::Path;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum VariantError {
    #[error("failed to read config {0}: {1}")]
    Read(String, std::io::Error),
    #[error("failed to write config {0}: {1}")]
    Write(String, std::io::Error),
    #[error("invalid config JSON in {0}: {1}")]
    Json(String, serde_json::Error),
    #[error("base config is not a JSON object")]
    NotAnObject,
    #[error("parameter {param} is {value}, expected a number to scale")]
    NotNumeric { param: String, value: Value },
    #[error("scaling {param} gives a non-finite value")]
    NonFinite { param: String },
}

/// A base config with one parameter changed.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedVariant {
    pub config: Value,
    /// The parameter's value in the base config, if it had one.
    pub baseline_value: Option<Value>,
    pub new_value: Value,
}

/// Apply `spec` to a copy of `base`.
///
/// An absolute change sets the parameter. A relative change multiplies the
/// base value, taking 1.0 when the base config does not set it.
pub fn apply(spec: &VariantSpec, base: &Value) -> Result<AppliedVariant, VariantError> {
    let Value::Object(base_map) = base else {
        return Err(VariantError::NotAnObject);
    };
    let baseline_value = base_map.get(&spec.param).cloned();

    let new_value = match &spec.change {
        ParamChange::Absolute { value } => value.clone(),
        ParamChange::Relative { factor } => {
            let original = match &baseline_value {
                None => 1.0,
                Some(v) => v.as_f64().ok_or_else(|| VariantError::NotNumeric {
                    param: spec.param.clone(),
                    value: v.clone(),
                })?,
            };
            Number::from_f64(original * factor)
                .map(Value::Number)
                .ok_or_else(|| VariantError::NonFinite {
                    param: spec.param.clone(),
                })?
        }
    };

    let mut config: Map<String, Value> = base_map.clone();
    config.insert(spec.param.clone(), new_value.clone());
    debug!(
        variant = spec.name,
        param = spec.param,
        from = ?baseline_value,
        to = %new_value,
        "variant config built"
    );

    Ok(AppliedVariant {
        config: Value::Object(config),
        baseline_value,
        new_value,
    })
}

pub fn load_json(path: &Path) -> Result<Value, VariantError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| VariantError::Read(path.display().to_string(), e))?;
    serde_json::from_str(&content).map_err(|e| VariantError::Json(path.display().to_string(), e))
}

pub fn save_json(value: &Value, path: &Path) -> Result<(), VariantError> {
    let content = serde_json::to_string_pretty(value)
        .map_err(|e| VariantError::Json(path.display().to_string(), e))?;
    std::fs::write(path, content).map_err(|e| VariantError::Write(path.display().to_string(), e))
}
